//! One partial exchange: payload harvest, wire form and lifecycle state.
use crate::config::RequestOptions;
use bus::Listeners;
use core_types::{RequestId, RequestState};
use html::traverse::{find_named_descendant, resolve_by_id_or_name, resolve_owning_form};
use html::{Document, FieldValue, HarvestScope, NodeKey, harvest_fields};
use net::{Exchange, Method, PayloadValue};
use runtime_parse::{ProtocolNames, ResponseError};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("no element resolves from {0:?}")]
    UnknownSource(String),
    #[error("{0:?} has no owning form")]
    MissingParentForm(String),
    #[error("cannot resolve form action {action:?}: {reason}")]
    InvalidAction { action: String, reason: String },
    #[error(transparent)]
    Response(#[from] ResponseError),
}

/// What a trigger asks for, before it is bound to the document.
#[derive(Debug, Default)]
pub struct RequestSpec {
    /// Ids to process on the server; `@this`, `@form`, `@all`, `@none` allowed.
    pub execute: Vec<String>,
    /// Ids to render back.
    pub render: Vec<String>,
    /// Name of the DOM event that triggered the request.
    pub event: Option<String>,
    /// Extra parameters appended after the markers.
    pub params: Vec<(String, String)>,
    pub options: RequestOptions,
    pub listeners: Listeners,
}

impl RequestSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute(mut self, ids: &str) -> Self {
        self.execute = split_ids(ids);
        self
    }

    pub fn render(mut self, ids: &str) -> Self {
        self.render = split_ids(ids);
        self
    }

    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.event = Some(name.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

fn split_ids(ids: &str) -> Vec<String> {
    ids.split_whitespace().map(str::to_string).collect()
}

fn expand_ids(ids: &[String], source_id: &str, form_id: &str) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = match id.as_str() {
            "@this" => source_id,
            "@form" => form_id,
            other => other,
        };
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out.join(" ")
}

#[derive(Debug)]
pub struct Request {
    id: RequestId,
    source_id: String,
    form: Option<NodeKey>,
    action: String,
    method: Method,
    fields: Vec<(String, PayloadValue)>,
    options: RequestOptions,
    state: RequestState,
    pub(crate) listeners: Listeners,
}

impl Request {
    /// Bind `spec` to the document: resolve the source and its form and
    /// harvest the payload.
    pub fn build(
        id: RequestId,
        doc: &Document,
        source: &str,
        spec: RequestSpec,
        names: &ProtocolNames,
        defaults: &RequestOptions,
    ) -> Result<Self, RequestError> {
        let source_key = resolve_by_id_or_name(doc, source)
            .ok_or_else(|| RequestError::UnknownSource(source.to_string()))?;
        let form = resolve_owning_form(doc, source_key)
            .ok_or_else(|| RequestError::MissingParentForm(source.to_string()))?;

        let source_id = doc
            .attr(source_key, "id")
            .or_else(|| doc.attr(source_key, "name"))
            .unwrap_or(source)
            .to_string();
        let form_id = doc.attr(form, "id").unwrap_or_default().to_string();
        let options = spec.options.or(defaults);

        let restrict: Option<Vec<NodeKey>> = options.partial_submit_ids.as_ref().map(|ids| {
            ids.iter()
                .filter_map(|id| resolve_by_id_or_name(doc, id))
                .collect()
        });
        let scope = HarvestScope {
            form,
            restrict_to: restrict.as_deref(),
            trigger: Some(source_key),
        };
        let mut fields: Vec<(String, PayloadValue)> = harvest_fields(doc, &scope)
            .into_iter()
            .map(|(name, value)| (name, payload_value(value)))
            .collect();

        if !fields.iter().any(|(n, _)| names.is_view_state_field(n))
            && let Some(field) = find_named_descendant(doc, form, &names.view_state)
        {
            let token = doc.attr(field, "value").unwrap_or_default();
            fields.push((names.view_state.clone(), PayloadValue::Text(token.to_string())));
        }

        let text = |s: &str| PayloadValue::Text(s.to_string());
        fields.push((names.source_param.clone(), text(source_id.as_str())));
        fields.push((names.ajax_param.clone(), text("true")));
        let execute = if spec.execute.is_empty() {
            source_id.clone()
        } else {
            expand_ids(&spec.execute, &source_id, &form_id)
        };
        fields.push((names.execute_param.clone(), text(execute.as_str())));
        let render = expand_ids(&spec.render, &source_id, &form_id);
        if !render.is_empty() {
            fields.push((names.render_param.clone(), text(render.as_str())));
        }
        if let Some(event) = &spec.event {
            fields.push((names.event_param.clone(), text(event.as_str())));
        }
        for (name, value) in spec.params {
            fields.push((name, PayloadValue::Text(value)));
        }

        let method = match doc.attr(form, "method") {
            Some(m) if m.eq_ignore_ascii_case("get") => Method::Get,
            _ => Method::Post,
        };
        log::debug!(
            target: "ajax.request",
            "built request {id} from {source_id:?} with {} field(s)",
            fields.len()
        );
        Ok(Self {
            id,
            source_id,
            form: Some(form),
            action: doc.attr(form, "action").unwrap_or_default().to_string(),
            method,
            fields,
            options,
            state: RequestState::Queued,
            listeners: spec.listeners,
        })
    }

    #[cfg(test)]
    pub(crate) fn detached(id: RequestId, action: &str) -> Self {
        Self {
            id,
            source_id: format!("src{id}"),
            form: None,
            action: action.to_string(),
            method: Method::Post,
            fields: Vec::new(),
            options: RequestOptions::default(),
            state: RequestState::Queued,
            listeners: Listeners::new(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn form(&self) -> Option<NodeKey> {
        self.form
    }

    pub fn fields(&self) -> &[(String, PayloadValue)] {
        &self.fields
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Move along `Queued -> Sending -> terminal -> Done`. Out-of-order moves
    /// are ignored.
    pub(crate) fn transition(&mut self, to: RequestState) -> bool {
        let allowed = match (self.state, to) {
            (RequestState::Queued, RequestState::Sending) => true,
            (RequestState::Queued | RequestState::Sending, next) if next.is_terminal() => true,
            (from, RequestState::Done) => from.is_terminal(),
            _ => false,
        };
        if allowed {
            log::trace!(target: "ajax.request", "request {}: {:?} -> {:?}", self.id, self.state, to);
            self.state = to;
        } else {
            log::warn!(
                target: "ajax.request",
                "request {}: ignoring transition {:?} -> {:?}",
                self.id,
                self.state,
                to
            );
        }
        allowed
    }

    /// Wire form of the request. Relative actions resolve against `base`.
    pub fn exchange(&self, base: Option<&Url>, names: &ProtocolNames) -> Result<Exchange, RequestError> {
        let invalid = |reason: String| RequestError::InvalidAction {
            action: self.action.clone(),
            reason,
        };
        let url = match Url::parse(&self.action) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match base {
                Some(base) => base.join(&self.action).map_err(|e| invalid(e.to_string()))?,
                None => return Err(invalid("relative action without a base url".to_string())),
            },
            Err(e) => return Err(invalid(e.to_string())),
        };
        Ok(Exchange {
            request_id: self.id,
            url: url.to_string(),
            method: self.method,
            fields: self.fields.clone(),
            headers: vec![(
                names.partial_header.clone(),
                names.partial_header_value.clone(),
            )],
        })
    }
}

fn payload_value(value: FieldValue) -> PayloadValue {
    match value {
        FieldValue::Text(text) => PayloadValue::Text(text),
        FieldValue::File(file) => PayloadValue::File {
            file_name: file.file_name,
            content_type: file.content_type,
            bytes: file.bytes,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use html::FilePart;

    const PAGE: &str = "<html><body>\
        <form id=f action=/app/page.xhtml>\
          <input name=q value=hello>\
          <div id=panel><input name=p value=1></div>\
          <input type=checkbox name=c>\
          <input type=hidden name=javax.faces.ViewState value=tok>\
          <input type=submit id=go name=go value=Go>\
          <input type=file name=up id=up>\
        </form>\
        <button id=orphan>x</button>\
        </body></html>";

    fn build(doc: &Document, source: &str, spec: RequestSpec) -> Result<Request, RequestError> {
        Request::build(1, doc, source, spec, &ProtocolNames::default(), &RequestOptions::default())
    }

    fn text_fields(req: &Request) -> Vec<(String, String)> {
        req.fields()
            .iter()
            .filter_map(|(n, v)| match v {
                PayloadValue::Text(t) => Some((n.clone(), t.clone())),
                PayloadValue::File { .. } => None,
            })
            .collect()
    }

    #[test]
    fn payload_carries_fields_then_markers() {
        let doc = Document::parse(PAGE);
        let req = build(&doc, "go", RequestSpec::new().render("panel @form").event("click")).unwrap();
        let pairs = text_fields(&req);
        let names: Vec<_> = pairs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "q",
                "p",
                "javax.faces.ViewState",
                "go",
                "javax.faces.source",
                "javax.faces.partial.ajax",
                "javax.faces.partial.execute",
                "javax.faces.partial.render",
                "javax.faces.partial.event",
            ]
        );
        let value = |n: &str| pairs.iter().find(|(k, _)| k == n).map(|(_, v)| v.as_str());
        assert_eq!(value("javax.faces.partial.execute"), Some("go"));
        assert_eq!(value("javax.faces.partial.render"), Some("panel f"));
        assert_eq!(value("javax.faces.partial.ajax"), Some("true"));
        assert_eq!(req.state(), RequestState::Queued);
    }

    #[test]
    fn partial_submit_keeps_token_and_trigger() {
        let doc = Document::parse(PAGE);
        let options = RequestOptions::default().with_partial_submit(vec!["panel".to_string()]);
        let req = build(&doc, "go", RequestSpec::new().options(options)).unwrap();
        let names: Vec<_> = text_fields(&req).into_iter().map(|(n, _)| n).collect();
        assert_eq!(&names[..3], &["p", "go", "javax.faces.ViewState"]);
    }

    #[test]
    fn files_are_carried_as_file_parts() {
        let mut doc = Document::parse(PAGE);
        let up = doc.element_by_id("up").unwrap();
        doc.set_files(
            up,
            vec![FilePart {
                file_name: "a.txt".into(),
                content_type: Some("text/plain".into()),
                bytes: b"abc".to_vec(),
            }],
        )
        .unwrap();
        let req = build(&doc, "go", RequestSpec::new()).unwrap();
        let exchange = req
            .exchange(Url::parse("http://h/").ok().as_ref(), &ProtocolNames::default())
            .unwrap();
        assert!(exchange.has_files());
    }

    #[test]
    fn missing_form_and_unknown_source() {
        let doc = Document::parse(PAGE);
        assert!(matches!(
            build(&doc, "orphan", RequestSpec::new()),
            Err(RequestError::MissingParentForm(_))
        ));
        assert!(matches!(
            build(&doc, "ghost", RequestSpec::new()),
            Err(RequestError::UnknownSource(_))
        ));
    }

    #[test]
    fn exchange_resolves_action_and_sets_header() {
        let doc = Document::parse(PAGE);
        let req = build(&doc, "go", RequestSpec::new()).unwrap();
        let names = ProtocolNames::default();
        let base = Url::parse("http://localhost:8080/app/index.xhtml").unwrap();
        let exchange = req.exchange(Some(&base), &names).unwrap();
        assert_eq!(exchange.url, "http://localhost:8080/app/page.xhtml");
        assert_eq!(exchange.method, Method::Post);
        assert_eq!(
            exchange.headers,
            vec![("Faces-Request".to_string(), "partial/ajax".to_string())]
        );
        assert!(matches!(
            req.exchange(None, &names),
            Err(RequestError::InvalidAction { .. })
        ));
    }

    #[test]
    fn lifecycle_rejects_out_of_order_moves() {
        let mut req = Request::detached(9, "http://h/");
        assert!(!req.transition(RequestState::Done));
        assert!(req.transition(RequestState::Sending));
        assert!(!req.transition(RequestState::Queued));
        assert!(req.transition(RequestState::TimedOut));
        assert!(!req.transition(RequestState::Succeeded));
        assert!(req.transition(RequestState::Done));
        assert_eq!(req.state(), RequestState::Done);
    }
}
