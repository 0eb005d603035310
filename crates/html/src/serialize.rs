use crate::document::{Document, NodeData};
use crate::tokenizer::is_void_element;
use crate::types::NodeKey;

fn escape_into(out: &mut String, text: &str, in_attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn is_raw_text_parent(doc: &Document, key: NodeKey) -> bool {
    doc.parent(key)
        .and_then(|p| doc.name(p))
        .is_some_and(|n| n.eq_ignore_ascii_case("script") || n.eq_ignore_ascii_case("style"))
}

fn write_node(doc: &Document, key: NodeKey, out: &mut String) {
    match doc.data(key) {
        Some(NodeData::Document { doctype }) => {
            if let Some(dt) = doctype {
                out.push_str("<!");
                out.push_str(dt);
                out.push('>');
            }
            write_children(doc, key, out);
        }
        Some(NodeData::Element { name, attributes }) => {
            out.push('<');
            out.push_str(name);
            for (k, v) in attributes {
                out.push(' ');
                out.push_str(k);
                if let Some(v) = v {
                    out.push_str("=\"");
                    escape_into(out, v, true);
                    out.push('"');
                }
            }
            out.push('>');
            if is_void_element(&name.to_ascii_lowercase()) {
                return;
            }
            write_children(doc, key, out);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        Some(NodeData::Text { text }) => {
            if is_raw_text_parent(doc, key) {
                out.push_str(text);
            } else {
                escape_into(out, text, false);
            }
        }
        Some(NodeData::Comment { text }) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        None => {}
    }
}

fn write_children(doc: &Document, key: NodeKey, out: &mut String) {
    for child in doc.children(key) {
        write_node(doc, *child, out);
    }
}

/// Markup of the node itself and its subtree.
pub fn outer_html(doc: &Document, key: NodeKey) -> String {
    let mut out = String::new();
    write_node(doc, key, &mut out);
    out
}

/// Markup of the node's children only.
pub fn inner_html(doc: &Document, key: NodeKey) -> String {
    let mut out = String::new();
    write_children(doc, key, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_escaped_text_and_voids() {
        let doc = Document::parse("<div id=\"a\" title='x \"y\"'>1 &lt; 2<br><script>a<b</script></div>");
        let div = doc.element_by_id("a").unwrap();
        assert_eq!(
            outer_html(&doc, div),
            "<div id=\"a\" title=\"x &quot;y&quot;\">1 &lt; 2<br><script>a<b</script></div>"
        );
    }

    #[test]
    fn inner_html_round_trips_through_parse() {
        let markup = "<ul><li class=\"x\">one</li><li>two</li></ul>";
        let doc = Document::parse(markup);
        assert_eq!(inner_html(&doc, Document::ROOT), markup);
    }
}
