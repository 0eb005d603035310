//! Successful-control harvesting for partial submits.
use crate::document::{Document, FilePart};
use crate::types::NodeKey;
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    File(FilePart),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::File(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    Text,
    Checkable,
    Button { submits: bool },
    File,
    Select,
    TextArea,
}

pub fn control_kind(doc: &Document, key: NodeKey) -> Option<ControlKind> {
    let name = doc.name(key)?.to_ascii_lowercase();
    match name.as_str() {
        "select" => Some(ControlKind::Select),
        "textarea" => Some(ControlKind::TextArea),
        "button" => {
            let ty = doc.attr(key, "type").unwrap_or("submit");
            Some(ControlKind::Button {
                submits: ty.trim().eq_ignore_ascii_case("submit"),
            })
        }
        "input" => {
            let ty = doc
                .attr(key, "type")
                .map(str::trim)
                .unwrap_or("text")
                .to_ascii_lowercase();
            Some(match ty.as_str() {
                "checkbox" | "radio" => ControlKind::Checkable,
                "submit" => ControlKind::Button { submits: true },
                "button" | "reset" | "image" => ControlKind::Button { submits: false },
                "file" => ControlKind::File,
                _ => ControlKind::Text,
            })
        }
        _ => None,
    }
}

fn is_disabled(doc: &Document, key: NodeKey) -> bool {
    if doc.has_attr(key, "disabled") {
        return true;
    }
    // Controls inside a disabled fieldset are disabled too.
    doc.ancestors(key)
        .any(|k| doc.is_element(k, "fieldset") && doc.has_attr(k, "disabled"))
}

/// Where to harvest from and which element triggered the submit.
#[derive(Clone, Debug)]
pub struct HarvestScope<'a> {
    pub form: NodeKey,
    /// Partial submit: only controls under these roots are harvested.
    pub restrict_to: Option<&'a [NodeKey]>,
    pub trigger: Option<NodeKey>,
}

/// Collect `(name, value)` pairs of the successful controls in scope, in
/// document order.
pub fn harvest_fields(doc: &Document, scope: &HarvestScope<'_>) -> Vec<(String, FieldValue)> {
    let mut candidates: Vec<NodeKey> = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |k: NodeKey, out: &mut Vec<NodeKey>| {
        if seen.insert(k) {
            out.push(k);
        }
    };

    match scope.restrict_to {
        Some(roots) => {
            for root in roots {
                for k in doc.preorder(*root) {
                    push(k, &mut candidates);
                }
            }
        }
        None => {
            for k in doc.preorder(scope.form) {
                push(k, &mut candidates);
            }
            // Controls bound to the form from elsewhere via `form="..."`.
            if let Some(form_id) = doc.attr(scope.form, "id").filter(|id| !id.is_empty()) {
                for k in doc.preorder(Document::ROOT) {
                    if doc.attr(k, "form") == Some(form_id) && control_kind(doc, k).is_some() {
                        push(k, &mut candidates);
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    let mut trigger_done = false;
    for key in candidates {
        let Some(kind) = control_kind(doc, key) else {
            continue;
        };
        if is_disabled(doc, key) {
            continue;
        }
        let Some(name) = doc.attr(key, "name").filter(|n| !n.is_empty()) else {
            continue;
        };
        match kind {
            ControlKind::Text => {
                let value = doc.attr(key, "value").unwrap_or("");
                out.push((name.to_string(), FieldValue::Text(value.to_string())));
            }
            ControlKind::Checkable => {
                if doc.has_attr(key, "checked") {
                    let value = doc.attr(key, "value").filter(|v| !v.is_empty()).unwrap_or("on");
                    out.push((name.to_string(), FieldValue::Text(value.to_string())));
                }
            }
            ControlKind::TextArea => {
                out.push((name.to_string(), FieldValue::Text(doc.text_content(key))));
            }
            ControlKind::Select => {
                for option in doc.elements_by_tag(key, "option") {
                    if doc.has_attr(option, "selected") && !is_disabled(doc, option) {
                        out.push((name.to_string(), FieldValue::Text(option_value(doc, option))));
                    }
                }
            }
            ControlKind::File => {
                for file in doc.files(key) {
                    out.push((name.to_string(), FieldValue::File(file.clone())));
                }
            }
            ControlKind::Button { submits } => {
                if submits && Some(key) == scope.trigger && !trigger_done {
                    trigger_done = true;
                    let value = doc.attr(key, "value").unwrap_or("");
                    out.push((name.to_string(), FieldValue::Text(value.to_string())));
                }
            }
        }
    }

    // A submit control outside the harvested scope still identifies itself.
    if !trigger_done
        && let Some(trigger) = scope.trigger
        && control_kind(doc, trigger) == Some(ControlKind::Button { submits: true })
        && !is_disabled(doc, trigger)
        && let Some(name) = doc.attr(trigger, "name").filter(|n| !n.is_empty())
    {
        let value = doc.attr(trigger, "value").unwrap_or("");
        out.push((name.to_string(), FieldValue::Text(value.to_string())));
    }

    out
}

fn option_value(doc: &Document, option: NodeKey) -> String {
    match doc.attr(option, "value") {
        Some(v) => v.to_string(),
        None => doc.text_content(option).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<form id=f>\
        <input name=t value=hello>\
        <input name=off value=x disabled>\
        <input type=checkbox name=c1 checked>\
        <input type=checkbox name=c2 value=no>\
        <input type=radio name=r value=a><input type=radio name=r value=b checked>\
        <select name=s multiple><option value=1 selected>One</option><option>Two</option><option selected> Three </option></select>\
        <textarea name=ta>body</textarea>\
        <input type=submit name=go value=Go id=go>\
        <input type=submit name=other value=Other>\
        <button name=b>B</button>\
        <input type=reset name=rs>\
        <fieldset disabled><input name=fs value=1></fieldset>\
        <div id=part><input name=p value=pv></div>\
        </form>\
        <input name=ext form=f value=e>";

    fn texts(fields: &[(String, FieldValue)]) -> Vec<(String, String)> {
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.as_text().unwrap_or("<file>").to_string()))
            .collect()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn harvests_successful_controls_in_order() {
        let doc = Document::parse(PAGE);
        let form = doc.element_by_id("f").unwrap();
        let trigger = doc.element_by_id("go");
        let fields = harvest_fields(
            &doc,
            &HarvestScope {
                form,
                restrict_to: None,
                trigger,
            },
        );
        assert_eq!(
            texts(&fields),
            pairs(&[
                ("t", "hello"),
                ("c1", "on"),
                ("r", "b"),
                ("s", "1"),
                ("s", "Three"),
                ("ta", "body"),
                ("go", "Go"),
                ("p", "pv"),
                ("ext", "e"),
            ])
        );
    }

    #[test]
    fn partial_submit_restricts_to_subtrees_and_keeps_trigger() {
        let doc = Document::parse(PAGE);
        let form = doc.element_by_id("f").unwrap();
        let part = [doc.element_by_id("part").unwrap()];
        let fields = harvest_fields(
            &doc,
            &HarvestScope {
                form,
                restrict_to: Some(&part),
                trigger: doc.element_by_id("go"),
            },
        );
        assert_eq!(texts(&fields), pairs(&[("p", "pv"), ("go", "Go")]));
    }

    #[test]
    fn file_inputs_yield_binary_parts() {
        let mut doc = Document::parse("<form id=f><input type=file name=up id=up></form>");
        let form = doc.element_by_id("f").unwrap();
        let up = doc.element_by_id("up").unwrap();
        doc.set_files(
            up,
            vec![FilePart {
                file_name: "a.txt".into(),
                content_type: Some("text/plain".into()),
                bytes: b"hi".to_vec(),
            }],
        )
        .unwrap();
        let fields = harvest_fields(
            &doc,
            &HarvestScope {
                form,
                restrict_to: None,
                trigger: None,
            },
        );
        assert!(matches!(&fields[..], [(name, FieldValue::File(f))] if name == "up" && f.bytes == b"hi"));
    }
}
