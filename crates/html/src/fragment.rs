//! Tree construction on top of the tokenizer.
//!
//! - [`parse_fragment`] is the forgiving recursive-descent scanner: it never
//!   fails, closes unbalanced elements implicitly and drops stray end tags.
//! - [`HostParser`] is the default [`MarkupParser`]. It enforces the HTML
//!   context rules a browser applies to fragments (table sections only inside
//!   a table, cells only inside a row) and reports a violation instead of
//!   silently re-parenting content.
//! - [`parse_xml`] is strict and backs the partial-response reader.
use crate::tokenizer::{ScanMode, tokenize};
use crate::types::{Node, Token};
use thiserror::Error;

/// Nesting bound for all builders; deeper input is flattened (lenient) or
/// rejected (strict).
const MAX_DEPTH: usize = 256;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("document is empty")]
    Empty,
    #[error("element <{0}> is never closed")]
    Unclosed(String),
    #[error("end tag </{found}> does not match open element <{expected}>")]
    MismatchedEndTag { expected: String, found: String },
    #[error("end tag </{0}> has no open element")]
    UnexpectedEndTag(String),
    #[error("<{tag}> is not allowed inside <{parent}>")]
    MisplacedTableContent { tag: String, parent: String },
    #[error("nesting deeper than {MAX_DEPTH} elements")]
    TooDeep,
}

/// Markup parsing capability of the host runtime.
///
/// `context` is the tag name of the element the parsed nodes will be placed
/// into; hosts use it to apply their context-sensitive parsing rules.
pub trait MarkupParser {
    fn parse(&self, markup: &str, context: &str) -> Result<Vec<Node>, ParseError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostParser;

impl MarkupParser for HostParser {
    fn parse(&self, markup: &str, context: &str) -> Result<Vec<Node>, ParseError> {
        let tokens = tokenize(markup, ScanMode::Html);
        let nodes = TreeBuilder::new(&tokens, Strictness::Lenient).build()?;
        check_table_context(&nodes, &context.to_ascii_lowercase())?;
        Ok(nodes)
    }
}

fn allowed_parents(tag: &str) -> Option<&'static [&'static str]> {
    match tag {
        "tr" => Some(&["table", "tbody", "thead", "tfoot"]),
        "td" | "th" => Some(&["tr"]),
        "tbody" | "thead" | "tfoot" | "caption" | "colgroup" => Some(&["table"]),
        "col" => Some(&["table", "colgroup"]),
        _ => None,
    }
}

fn check_table_context(nodes: &[Node], parent: &str) -> Result<(), ParseError> {
    for node in nodes {
        let Node::Element { name, children, .. } = node else {
            continue;
        };
        if let Some(parents) = allowed_parents(name)
            && !parents.contains(&parent)
        {
            return Err(ParseError::MisplacedTableContent {
                tag: name.clone(),
                parent: parent.to_string(),
            });
        }
        check_table_context(children, name)?;
    }
    Ok(())
}

/// Forgiving fragment scan. The parsed nodes are returned as children of a
/// synthetic `root_hint` element.
pub fn parse_fragment(text: &str, root_hint: &str) -> Node {
    let tokens = tokenize(text, ScanMode::Html);
    let children = TreeBuilder::new(&tokens, Strictness::Lenient)
        .build()
        .unwrap_or_default();
    Node::element(root_hint.to_ascii_lowercase(), children)
}

/// Forgiving parse of a whole page.
pub fn parse_document(html: &str) -> Node {
    let tokens = tokenize(html, ScanMode::Html);
    let doctype = tokens.iter().find_map(|t| match t {
        Token::Doctype(d) => Some(d.clone()),
        _ => None,
    });
    let children = TreeBuilder::new(&tokens, Strictness::Lenient)
        .build()
        .unwrap_or_default();
    Node::Document { doctype, children }
}

/// Strict XML parse: every element must be closed by a matching end tag.
pub fn parse_xml(text: &str) -> Result<Node, ParseError> {
    let tokens = tokenize(text, ScanMode::Xml);
    let children = TreeBuilder::new(&tokens, Strictness::Strict).build()?;
    if !children.iter().any(|c| matches!(c, Node::Element { .. })) {
        return Err(ParseError::Empty);
    }
    Ok(Node::Document {
        doctype: None,
        children,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strictness {
    Lenient,
    Strict,
}

struct TreeBuilder<'t> {
    tokens: &'t [Token],
    pos: usize,
    strictness: Strictness,
    open: Vec<String>,
}

impl<'t> TreeBuilder<'t> {
    fn new(tokens: &'t [Token], strictness: Strictness) -> Self {
        Self {
            tokens,
            pos: 0,
            strictness,
            open: Vec::new(),
        }
    }

    fn strict(&self) -> bool {
        self.strictness == Strictness::Strict
    }

    fn build(mut self) -> Result<Vec<Node>, ParseError> {
        let tokens = self.tokens;
        let mut out = Vec::new();
        while self.pos < tokens.len() {
            out.extend(self.children()?);
            // A stray end tag stopped the top level; drop it and carry on.
            if let Some(Token::EndTag(name)) = tokens.get(self.pos) {
                if self.strict() {
                    return Err(ParseError::UnexpectedEndTag(name.clone()));
                }
                self.pos += 1;
            }
        }
        Ok(out)
    }

    /// Parse siblings until the end tag of the innermost open element, the end
    /// tag of some outer open element (implicit close), or end of input.
    fn children(&mut self) -> Result<Vec<Node>, ParseError> {
        let tokens = self.tokens;
        let mut out: Vec<Node> = Vec::new();
        while let Some(token) = tokens.get(self.pos) {
            match token {
                Token::Text(text) | Token::CData(text) => {
                    self.pos += 1;
                    if let Some(Node::Text { text: prev }) = out.last_mut() {
                        prev.push_str(text);
                    } else {
                        out.push(Node::Text { text: text.clone() });
                    }
                }
                Token::Comment(text) => {
                    self.pos += 1;
                    out.push(Node::Comment { text: text.clone() });
                }
                Token::Doctype(_) => self.pos += 1,
                Token::StartTag {
                    name,
                    attributes,
                    self_closing,
                } => {
                    self.pos += 1;
                    let children = if *self_closing {
                        Vec::new()
                    } else if self.open.len() >= MAX_DEPTH {
                        if self.strict() {
                            return Err(ParseError::TooDeep);
                        }
                        // Flatten: the content becomes siblings of this element.
                        Vec::new()
                    } else {
                        self.open.push(name.clone());
                        let children = self.children()?;
                        self.open.pop();
                        self.close(name);
                        children
                    };
                    out.push(Node::Element {
                        name: name.clone(),
                        attributes: attributes.clone(),
                        children,
                    });
                }
                Token::EndTag(name) => {
                    let innermost = self.open.last();
                    if innermost.is_some_and(|open| open == name) {
                        return Ok(out);
                    }
                    if self.strict() {
                        return Err(match innermost {
                            Some(expected) => ParseError::MismatchedEndTag {
                                expected: expected.clone(),
                                found: name.clone(),
                            },
                            None => ParseError::UnexpectedEndTag(name.clone()),
                        });
                    }
                    if self.open.iter().any(|open| open == name) || self.open.is_empty() {
                        // Implicit close of the innermost element, or a stray
                        // top-level end tag that `build` discards.
                        return Ok(out);
                    }
                    self.pos += 1;
                }
            }
        }
        if self.strict()
            && let Some(unclosed) = self.open.last()
        {
            return Err(ParseError::Unclosed(unclosed.clone()));
        }
        Ok(out)
    }

    /// Consume the end tag that closed `name`, if it is the next token.
    fn close(&mut self, name: &str) {
        if let Some(Token::EndTag(end)) = self.tokens.get(self.pos)
            && end == name
        {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_closes_unbalanced_elements() {
        let root = parse_fragment("<div><p>one<p>two</div><span>x</span>", "body");
        let names: Vec<_> = root.elements().filter_map(Node::name).collect();
        assert_eq!(names, vec!["div", "span"]);
        let div = root.first_element("div").unwrap();
        assert_eq!(div.text_content(), "onetwo");
    }

    #[test]
    fn fragment_drops_stray_end_tags() {
        let root = parse_fragment("a</b>c", "div");
        assert_eq!(root.text_content(), "ac");
    }

    #[test]
    fn fragment_accepts_table_rows_anywhere() {
        let root = parse_fragment("<tr id=r><td>1</td></tr>", "div");
        assert_eq!(root.first_element("tr").and_then(|tr| tr.attr("id")), Some("r"));
    }

    #[test]
    fn host_parser_rejects_rows_outside_tables() {
        let err = HostParser.parse("<tr><td>1</td></tr>", "body").unwrap_err();
        assert_eq!(
            err,
            ParseError::MisplacedTableContent {
                tag: "tr".into(),
                parent: "body".into()
            }
        );
        assert!(HostParser.parse("<tr><td>1</td></tr>", "tbody").is_ok());
        assert!(
            HostParser
                .parse("<table><tbody><tr><td>1</td></tr></tbody></table>", "body")
                .is_ok()
        );
    }

    #[test]
    fn xml_requires_balanced_tags() {
        assert!(parse_xml("<a><b></b></a>").is_ok());
        assert_eq!(
            parse_xml("<a><b></a>").unwrap_err(),
            ParseError::MismatchedEndTag {
                expected: "b".into(),
                found: "a".into()
            }
        );
        assert_eq!(parse_xml("<a>").unwrap_err(), ParseError::Unclosed("a".into()));
        assert_eq!(parse_xml("   ").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let deep = "<div>".repeat(MAX_DEPTH + 10);
        let root = parse_fragment(&deep, "body");
        assert!(!root.children().is_empty());
        assert_eq!(parse_xml(&deep).unwrap_err(), ParseError::TooDeep);
    }
}
