//! Applies a partial response to the live document.
//!
//! Invariants:
//! - Top-level elements and change elements are applied strictly in document
//!   order; a failure stops processing and keeps the applied prefix.
//! - The view-token fixup pass runs after the structural changes, whatever
//!   the outcome, and is the only writer of token fields.
use crate::protocol::ProtocolNames;
use crate::response::{Anchor, ChangeOperation, ResponseError, parse_response};
use html::traverse::{ancestor_form, forms_within, resolve_owning_form};
use html::{Document, DomPatcher, Node, NodeKey, PatchError, Position, ScriptHost, resolve_id};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied { operations: usize },
    Redirect(String),
}

enum Step {
    Continue,
    Redirect(String),
}

/// Bookkeeping for one response.
#[derive(Default)]
struct Pass {
    touched_forms: Vec<NodeKey>,
    operations: usize,
}

impl Pass {
    fn touch(&mut self, form: Option<NodeKey>) {
        if let Some(form) = form
            && !self.touched_forms.contains(&form)
        {
            self.touched_forms.push(form);
        }
    }

    fn touch_all(&mut self, forms: Vec<NodeKey>) {
        for form in forms {
            self.touch(Some(form));
        }
    }
}

pub struct ChangeInterpreter {
    names: ProtocolNames,
    patcher: DomPatcher,
    view_token: Option<String>,
}

impl ChangeInterpreter {
    pub fn new(names: ProtocolNames, bootstrap_script: impl Into<String>) -> Self {
        Self::with_patcher(names, DomPatcher::new(bootstrap_script))
    }

    pub fn with_patcher(names: ProtocolNames, patcher: DomPatcher) -> Self {
        Self {
            names,
            patcher,
            view_token: None,
        }
    }

    pub fn names(&self) -> &ProtocolNames {
        &self.names
    }

    /// Latest view token seen in any processed response.
    pub fn view_token(&self) -> Option<&str> {
        self.view_token.as_deref()
    }

    pub fn process(
        &mut self,
        doc: &mut Document,
        response: &str,
        host: &mut dyn ScriptHost,
    ) -> Result<Outcome, ResponseError> {
        let root = parse_response(response)?;
        let mut pass = Pass::default();
        let result = self.apply_response(doc, &root, host, &mut pass);
        self.fixup_view_token(doc, &pass);
        match &result {
            Ok(outcome) => log::debug!(target: "ajax.changes", "response processed: {outcome:?}"),
            Err(err) => log::debug!(
                target: "ajax.changes",
                "response stopped after {} operation(s): {err}",
                pass.operations
            ),
        }
        result
    }

    fn apply_response(
        &mut self,
        doc: &mut Document,
        root: &Node,
        host: &mut dyn ScriptHost,
        pass: &mut Pass,
    ) -> Result<Outcome, ResponseError> {
        for item in root.elements() {
            let children: Vec<&Node> = match item.name() {
                Some("changes") => item.elements().collect(),
                Some("error" | "redirect" | "extension") => vec![item],
                other => {
                    return Err(ResponseError::Malformed(format!(
                        "unexpected <{}> in partial-response",
                        other.unwrap_or_default()
                    )));
                }
            };
            for change in children {
                let op = ChangeOperation::decode(change)?;
                if let Step::Redirect(url) = self.apply(doc, op, host, pass)? {
                    return Ok(Outcome::Redirect(url));
                }
                pass.operations += 1;
            }
        }
        Ok(Outcome::Applied {
            operations: pass.operations,
        })
    }

    fn apply(
        &mut self,
        doc: &mut Document,
        op: ChangeOperation,
        host: &mut dyn ScriptHost,
        pass: &mut Pass,
    ) -> Result<Step, ResponseError> {
        log::trace!(target: "ajax.changes", "applying {op:?}");
        match op {
            ChangeOperation::Update { target_id, markup } => {
                self.update(doc, &target_id, &markup, host, pass)?;
            }
            ChangeOperation::Insert { anchor, markup, .. } => {
                let (anchor_id, position) = match &anchor {
                    Anchor::Before(id) => (id, Position::Before),
                    Anchor::After(id) => (id, Position::After),
                };
                let anchor = resolve_id(doc, anchor_id)?;
                pass.touch(doc.parent(anchor).and_then(|p| ancestor_form(doc, p)));
                let keys = self
                    .patcher
                    .insert_adjacent(doc, anchor, &markup, position, host)?;
                for key in keys {
                    pass.touch_all(forms_within(doc, key));
                }
            }
            ChangeOperation::Delete { target_id } => {
                let target = resolve_id(doc, &target_id)?;
                pass.touch(owning_form_outside(doc, target));
                self.patcher.remove(doc, target)?;
            }
            ChangeOperation::Attributes { target_id, pairs } => {
                let target = if target_id == self.names.view_root
                    || target_id == self.names.view_head
                {
                    return Err(PatchError::UnsupportedOperation(format!(
                        "attributes on {target_id}"
                    ))
                    .into());
                } else if target_id == self.names.view_body {
                    doc.body()
                        .ok_or_else(|| PatchError::UnknownNode("body".to_string()))?
                } else {
                    resolve_id(doc, &target_id)?
                };
                self.patcher.set_attributes(doc, target, &pairs)?;
            }
            ChangeOperation::Eval { script } => {
                host.eval(&script).map_err(PatchError::from)?;
            }
            ChangeOperation::Redirect { url } => {
                if url.is_empty() {
                    log::debug!(target: "ajax.changes", "ignoring redirect without url");
                } else {
                    return Ok(Step::Redirect(url));
                }
            }
            ChangeOperation::Error { name, message } => {
                return Err(ResponseError::ServerError { name, message });
            }
            ChangeOperation::Extension => {}
        }
        Ok(Step::Continue)
    }

    fn update(
        &mut self,
        doc: &mut Document,
        target_id: &str,
        markup: &str,
        host: &mut dyn ScriptHost,
        pass: &mut Pass,
    ) -> Result<(), ResponseError> {
        if self.names.is_view_state_id(target_id) {
            self.view_token = Some(markup.trim().to_string());
            return Ok(());
        }
        if target_id == self.names.view_root {
            self.patcher.replace_document(doc, markup, host)?;
            pass.touch_all(doc.forms());
            return Ok(());
        }
        if target_id == self.names.view_head {
            self.patcher.replace_head(markup, host)?;
            return Ok(());
        }
        if target_id == self.names.view_body {
            self.patcher.replace_body(doc, markup, host)?;
            pass.touch_all(doc.forms());
            return Ok(());
        }

        let target = resolve_id(doc, target_id)?;
        pass.touch(owning_form_outside(doc, target));
        let keys = self.patcher.replace_subtree(doc, target, markup, host)?;
        for key in keys {
            pass.touch_all(forms_within(doc, key));
        }
        Ok(())
    }

    fn token_field(&self, doc: &Document, form: NodeKey) -> Option<NodeKey> {
        doc.descendants(form).find(|k| {
            doc.is_element(*k, "input")
                && doc
                    .attr(*k, "name")
                    .is_some_and(|n| self.names.is_view_state_field(n))
        })
    }

    /// Write the latest token into every form this response touched. Other
    /// forms keep whatever token they already carry.
    fn fixup_view_token(&self, doc: &mut Document, pass: &Pass) {
        let Some(token) = self.view_token.as_deref() else {
            return;
        };
        let forms: Vec<NodeKey> = pass
            .touched_forms
            .iter()
            .copied()
            .filter(|f| doc.is_connected(*f) && doc.is_element(*f, "form"))
            .collect();

        for form in forms {
            let result = match self.token_field(doc, form) {
                Some(field) => doc.set_attr(field, "value", token),
                None => {
                    let field = doc.create_element(
                        "input",
                        vec![
                            ("type".to_string(), Some("hidden".to_string())),
                            ("name".to_string(), Some(self.names.view_state.clone())),
                            ("value".to_string(), Some(token.to_string())),
                        ],
                    );
                    doc.append_child(form, field)
                }
            };
            match result {
                Ok(()) => log::trace!(target: "ajax.changes", "view token fixed up in form {form:?}"),
                Err(err) => log::warn!(target: "ajax.changes", "view token fixup failed for {form:?}: {err}"),
            }
        }
    }
}

/// Owning form of `key`, unless `key` is that form itself.
fn owning_form_outside(doc: &Document, key: NodeKey) -> Option<NodeKey> {
    if doc.is_element(key, "form") {
        return doc.parent(key).and_then(|p| ancestor_form(doc, p));
    }
    resolve_owning_form(doc, key)
}
