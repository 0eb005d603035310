#![no_main]

use html::{Document, NoScripts};
use libfuzzer_sys::fuzz_target;
use runtime_parse::{ChangeInterpreter, ProtocolNames};

const PAGE: &str = "<html><head></head><body>\
    <form id=\"f\"><input type=\"hidden\" name=\"javax.faces.ViewState\" value=\"1\">\
    <table><tbody id=\"rows\"><tr id=\"r1\"><td>a</td></tr></tbody></table>\
    <div id=\"out\">x</div></form></body></html>";

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut doc = Document::parse(PAGE);
    let mut interpreter = ChangeInterpreter::new(ProtocolNames::default(), "jsf.js");
    let _ = interpreter.process(&mut doc, text, &mut NoScripts);
});
