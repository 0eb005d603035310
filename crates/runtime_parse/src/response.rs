//! Response document decoding.
//!
//! The whole response is parsed before anything is applied. Individual change
//! elements are decoded lazily, so an unrecognized element aborts processing
//! at its position and leaves the already-applied prefix in place.
use html::{Node, PatchError, parse_xml};
use thiserror::Error;

pub const ROOT_ELEMENT: &str = "partial-response";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("empty response")]
    Empty,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("server error {name}: {message}")]
    ServerError { name: String, message: String },
    #[error(transparent)]
    Patch(#[from] PatchError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Anchor {
    Before(String),
    After(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeOperation {
    Update {
        target_id: String,
        markup: String,
    },
    Insert {
        new_id: Option<String>,
        anchor: Anchor,
        markup: String,
    },
    Delete {
        target_id: String,
    },
    Attributes {
        target_id: String,
        pairs: Vec<(String, String)>,
    },
    Eval {
        script: String,
    },
    Redirect {
        url: String,
    },
    Error {
        name: String,
        message: String,
    },
    Extension,
}

/// Parse a raw response body and return its `partial-response` element.
pub fn parse_response(text: &str) -> Result<Node, ResponseError> {
    if text.trim().is_empty() {
        return Err(ResponseError::Empty);
    }
    let doc = parse_xml(text).map_err(|e| ResponseError::Malformed(e.to_string()))?;
    let root = doc
        .into_children()
        .into_iter()
        .find(|n| matches!(n, Node::Element { .. }))
        .ok_or(ResponseError::Empty)?;
    if !root.is_element(ROOT_ELEMENT) {
        return Err(ResponseError::Malformed(format!(
            "expected <{ROOT_ELEMENT}>, found <{}>",
            root.name().unwrap_or_default()
        )));
    }
    Ok(root)
}

fn required_attr(node: &Node, attr: &str) -> Result<String, ResponseError> {
    node.attr(attr)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ResponseError::Malformed(format!(
                "<{}> is missing its {attr} attribute",
                node.name().unwrap_or_default()
            ))
        })
}

fn child_text(node: &Node, tag: &str) -> String {
    node.first_element(tag)
        .map(|n| n.text_content().trim().to_string())
        .unwrap_or_default()
}

impl ChangeOperation {
    pub fn decode(node: &Node) -> Result<Self, ResponseError> {
        let tag = node.name().unwrap_or_default();
        let op = match tag {
            "update" => ChangeOperation::Update {
                target_id: required_attr(node, "id")?,
                markup: node.text_content(),
            },
            "insert" => decode_insert(node)?,
            "delete" => ChangeOperation::Delete {
                target_id: required_attr(node, "id")?,
            },
            "attributes" => {
                let mut pairs = Vec::new();
                for attr in node.elements() {
                    if !attr.is_element("attribute") {
                        return Err(ResponseError::Malformed(format!(
                            "unexpected <{}> in <attributes>",
                            attr.name().unwrap_or_default()
                        )));
                    }
                    pairs.push((
                        required_attr(attr, "name")?,
                        attr.attr("value").unwrap_or_default().to_string(),
                    ));
                }
                ChangeOperation::Attributes {
                    target_id: required_attr(node, "id")?,
                    pairs,
                }
            }
            "eval" => ChangeOperation::Eval {
                script: node.text_content(),
            },
            "redirect" => ChangeOperation::Redirect {
                url: node.attr("url").unwrap_or_default().trim().to_string(),
            },
            "error" => ChangeOperation::Error {
                name: child_text(node, "error-name"),
                message: child_text(node, "error-message"),
            },
            "extension" => ChangeOperation::Extension,
            other => {
                return Err(ResponseError::Malformed(format!(
                    "unrecognized change <{other}>"
                )));
            }
        };
        Ok(op)
    }
}

fn decode_insert(node: &Node) -> Result<ChangeOperation, ResponseError> {
    let new_id = node.attr("id").filter(|v| !v.is_empty()).map(str::to_string);

    // Attribute form: <insert id=".." before|after="..">markup</insert>
    let attr_anchor = match (node.attr("before"), node.attr("after")) {
        (Some(b), _) if !b.is_empty() => Some(Anchor::Before(b.to_string())),
        (_, Some(a)) if !a.is_empty() => Some(Anchor::After(a.to_string())),
        _ => None,
    };
    if let Some(anchor) = attr_anchor {
        return Ok(ChangeOperation::Insert {
            new_id,
            anchor,
            markup: node.text_content(),
        });
    }

    // Nested form: <insert><before id="..">markup</before></insert>
    let Some(inner) = node
        .elements()
        .find(|n| n.is_element("before") || n.is_element("after"))
    else {
        return Err(ResponseError::Malformed(
            "<insert> names no before or after anchor".to_string(),
        ));
    };
    let id = required_attr(inner, "id")?;
    let anchor = if inner.is_element("before") {
        Anchor::Before(id)
    } else {
        Anchor::After(id)
    };
    Ok(ChangeOperation::Insert {
        new_id,
        anchor,
        markup: inner.text_content(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(xml: &str) -> Vec<Result<ChangeOperation, ResponseError>> {
        let root = parse_response(xml).unwrap();
        let changes = root.first_element("changes").unwrap();
        changes.elements().map(ChangeOperation::decode).collect()
    }

    #[test]
    fn empty_and_malformed_bodies() {
        assert_eq!(parse_response("  \n"), Err(ResponseError::Empty));
        assert!(matches!(
            parse_response("<partial-response><changes>"),
            Err(ResponseError::Malformed(_))
        ));
        assert!(matches!(
            parse_response("<html><body/></html>"),
            Err(ResponseError::Malformed(_))
        ));
    }

    #[test]
    fn decodes_every_change_kind() {
        let got = ops(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <partial-response><changes>
              <update id="a"><![CDATA[<div id="a">x &amp; y</div>]]></update>
              <insert id="n" after="a"><![CDATA[<p id="n"/>]]></insert>
              <insert><before id="a"><![CDATA[<hr>]]></before></insert>
              <delete id="gone"/>
              <attributes id="i"><attribute name="disabled" value="false"/><attribute name="title" value="t"/></attributes>
              <eval><![CDATA[run()]]></eval>
              <extension ln="x"/>
            </changes></partial-response>"#,
        );
        let got: Vec<_> = got.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            got[0],
            ChangeOperation::Update {
                target_id: "a".into(),
                markup: "<div id=\"a\">x &amp; y</div>".into()
            }
        );
        assert_eq!(
            got[1],
            ChangeOperation::Insert {
                new_id: Some("n".into()),
                anchor: Anchor::After("a".into()),
                markup: "<p id=\"n\"/>".into()
            }
        );
        assert_eq!(
            got[2],
            ChangeOperation::Insert {
                new_id: None,
                anchor: Anchor::Before("a".into()),
                markup: "<hr>".into()
            }
        );
        assert_eq!(got[3], ChangeOperation::Delete { target_id: "gone".into() });
        assert_eq!(
            got[4],
            ChangeOperation::Attributes {
                target_id: "i".into(),
                pairs: vec![
                    ("disabled".into(), "false".into()),
                    ("title".into(), "t".into())
                ]
            }
        );
        assert_eq!(got[5], ChangeOperation::Eval { script: "run()".into() });
        assert_eq!(got[6], ChangeOperation::Extension);
    }

    #[test]
    fn unknown_change_is_malformed() {
        let got = ops("<partial-response><changes><update id=\"a\">x</update><explode/></changes></partial-response>");
        assert!(got[0].is_ok());
        assert!(matches!(got[1], Err(ResponseError::Malformed(_))));
    }

    #[test]
    fn error_element_carries_name_and_message() {
        let root = parse_response(
            "<partial-response><error><error-name>java.lang.NullPointerException</error-name>\
             <error-message><![CDATA[boom]]></error-message></error></partial-response>",
        )
        .unwrap();
        let error = root.first_element("error").unwrap();
        assert_eq!(
            ChangeOperation::decode(error),
            Ok(ChangeOperation::Error {
                name: "java.lang.NullPointerException".into(),
                message: "boom".into()
            })
        );
    }
}
