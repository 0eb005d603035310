//! Byte-oriented markup tokenizer shared by the HTML fragment parsers and the
//! partial-response reader.
//!
//! Two scan modes:
//! - [`ScanMode::Html`]: tag and attribute names are ASCII-lowercased, void
//!   elements self-close, and `<script>`/`<style>` bodies are raw text.
//! - [`ScanMode::Xml`]: names keep their case, nothing is implicitly closed,
//!   and `<?...?>` processing instructions are skipped.
//!
//! Both modes recognize comments and `<![CDATA[...]]>` sections.
//!
//! Known limitations:
//! - Not an HTML5 state machine; there is no standard error recovery.
//! - Tag/attribute names are restricted to ASCII `[A-Za-z0-9:_.-]`.
//! - Raw text close-tag scanning accepts only ASCII whitespace before `>`.
use crate::entities::decode_entities;
use crate::types::Token;
use memchr::memchr;

const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";
const CDATA_START: &str = "<![CDATA[";
const CDATA_END: &str = "]]>";
const PI_END: &str = "?>";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    Html,
    Xml,
}

pub(crate) fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

fn starts_with_ignore_ascii_case_at(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
    haystack.len() >= start + needle.len()
        && haystack[start..start + needle.len()].eq_ignore_ascii_case(needle)
}

/// Find `</name` followed by optional whitespace and `>`, case-insensitively.
/// Returns `(start_of_close_tag, end_after_gt)` relative to `haystack`.
fn find_raw_text_close(haystack: &str, name: &str) -> Option<(usize, usize)> {
    let bytes = haystack.as_bytes();
    let name = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        i += memchr(b'<', &bytes[i..])?;
        if bytes.get(i + 1) == Some(&b'/') && starts_with_ignore_ascii_case_at(bytes, i + 2, name)
        {
            let mut k = i + 2 + name.len();
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k < bytes.len() && bytes[k] == b'>' {
                return Some((i, k + 1));
            }
        }
        i += 1;
    }
    None
}

pub fn tokenize(input: &str, mode: ScanMode) -> Vec<Token> {
    Scanner {
        input,
        bytes: input.as_bytes(),
        pos: 0,
        mode,
        out: Vec::new(),
    }
    .run()
}

struct Scanner<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    mode: ScanMode,
    out: Vec<Token>,
}

impl<'a> Scanner<'a> {
    // Invariant: slices are only cut at ASCII structural bytes, so every slice
    // endpoint is a UTF-8 char boundary.
    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] != b'<' {
                self.text();
                continue;
            }
            let rest = &self.input[self.pos..];
            if rest.starts_with(COMMENT_START) {
                self.delimited(COMMENT_START, COMMENT_END, Token::Comment);
            } else if rest.starts_with(CDATA_START) {
                self.delimited(CDATA_START, CDATA_END, Token::CData);
            } else if starts_with_ignore_ascii_case_at(self.bytes, self.pos, b"<!doctype") {
                self.doctype();
            } else if rest.starts_with("<?") {
                self.skip_past(PI_END);
            } else if rest.starts_with("<!") {
                // Bogus declaration; treat like a comment body.
                self.skip_past(">");
            } else if self.bytes.get(self.pos + 1) == Some(&b'/') {
                self.end_tag();
            } else if self.bytes.get(self.pos + 1).copied().is_some_and(is_name_byte) {
                self.start_tag();
            } else {
                self.push_text("<".to_string());
                self.pos += 1;
            }
        }
        self.out
    }

    fn push_text(&mut self, text: String) {
        if let Some(Token::Text(prev)) = self.out.last_mut() {
            prev.push_str(&text);
            return;
        }
        self.out.push(Token::Text(text));
    }

    fn text(&mut self) {
        let start = self.pos;
        let end = memchr(b'<', &self.bytes[start..]).map_or(self.bytes.len(), |rel| start + rel);
        self.pos = end;
        let decoded = decode_entities(&self.input[start..end]).into_owned();
        if !decoded.is_empty() {
            self.push_text(decoded);
        }
    }

    fn delimited(&mut self, open: &str, close: &str, make: fn(String) -> Token) {
        let body_start = self.pos + open.len();
        match self.input[body_start..].find(close) {
            Some(rel) => {
                let body = &self.input[body_start..body_start + rel];
                self.out.push(make(body.to_string()));
                self.pos = body_start + rel + close.len();
            }
            None => {
                // Unterminated: the rest of the input is the body.
                self.out.push(make(self.input[body_start..].to_string()));
                self.pos = self.bytes.len();
            }
        }
    }

    fn skip_past(&mut self, close: &str) {
        self.pos = match self.input[self.pos..].find(close) {
            Some(rel) => self.pos + rel + close.len(),
            None => self.bytes.len(),
        };
    }

    fn doctype(&mut self) {
        let rest = &self.input[self.pos + 2..];
        match rest.find('>') {
            Some(end) => {
                self.out.push(Token::Doctype(rest[..end].trim().to_string()));
                self.pos += 2 + end + 1;
            }
            None => self.pos = self.bytes.len(),
        }
    }

    fn name_at(&self, start: usize) -> (String, usize) {
        let mut j = start;
        while j < self.bytes.len() && is_name_byte(self.bytes[j]) {
            j += 1;
        }
        let raw = &self.input[start..j];
        let name = match self.mode {
            ScanMode::Html => raw.to_ascii_lowercase(),
            ScanMode::Xml => raw.to_string(),
        };
        (name, j)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn end_tag(&mut self) {
        let (name, mut j) = self.name_at(self.pos + 2);
        j += memchr(b'>', &self.bytes[j..]).map_or(self.bytes.len() - j, |rel| rel + 1);
        self.pos = j;
        if !name.is_empty() {
            self.out.push(Token::EndTag(name));
        }
    }

    fn start_tag(&mut self) {
        let (name, j) = self.name_at(self.pos + 1);
        self.pos = j;
        let mut attributes = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            let Some(&b) = self.bytes.get(self.pos) else {
                break;
            };
            if b == b'>' {
                self.pos += 1;
                break;
            }
            if b == b'/' {
                self.pos += 1;
                if self.bytes.get(self.pos) == Some(&b'>') {
                    self_closing = true;
                    self.pos += 1;
                    break;
                }
                continue;
            }
            if !is_name_byte(b) {
                self.pos += 1;
                continue;
            }
            let (attr_name, k) = self.name_at(self.pos);
            self.pos = k;
            self.skip_whitespace();
            let value = if self.bytes.get(self.pos) == Some(&b'=') {
                self.pos += 1;
                self.skip_whitespace();
                Some(self.attribute_value())
            } else {
                None
            };
            attributes.push((attr_name, value));
        }

        if self.mode == ScanMode::Html && is_void_element(&name) {
            self_closing = true;
        }

        let raw_text = self.mode == ScanMode::Html
            && !self_closing
            && (name == "script" || name == "style" || name == "textarea" || name == "title");

        self.out.push(Token::StartTag {
            name: name.clone(),
            attributes,
            self_closing,
        });

        if raw_text {
            let body_start = self.pos;
            let (body_end, resume) = match find_raw_text_close(&self.input[body_start..], &name) {
                Some((rel_start, rel_end)) => (body_start + rel_start, body_start + rel_end),
                // Missing close tag: the remainder is raw text.
                None => (self.bytes.len(), self.bytes.len()),
            };
            let raw = &self.input[body_start..body_end];
            if !raw.is_empty() {
                let text = if name == "textarea" || name == "title" {
                    decode_entities(raw).into_owned()
                } else {
                    raw.to_string()
                };
                self.out.push(Token::Text(text));
            }
            self.out.push(Token::EndTag(name));
            self.pos = resume;
        }
    }

    fn attribute_value(&mut self) -> String {
        match self.bytes.get(self.pos) {
            Some(&quote @ (b'"' | b'\'')) => {
                let start = self.pos + 1;
                let end = memchr(quote, &self.bytes[start..]).map_or(self.bytes.len(), |r| start + r);
                self.pos = (end + 1).min(self.bytes.len());
                decode_entities(&self.input[start..end]).into_owned()
            }
            _ => {
                let start = self.pos;
                while self.pos < self.bytes.len() {
                    let b = self.bytes[self.pos];
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    if b == b'/' && self.bytes.get(self.pos + 1) == Some(&b'>') {
                        break;
                    }
                    self.pos += 1;
                }
                decode_entities(&self.input[start..self.pos]).into_owned()
            }
        }
    }
}
