use core_types::{ProjectStage, RequestId};
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::{Receiver, Sender, channel};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Event,
    Error,
}

/// Lifecycle status carried by an [`AjaxEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EventStatus {
    #[serde(rename = "begin")]
    Begin,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "httpError")]
    HttpError,
    #[serde(rename = "emptyResponse")]
    EmptyResponse,
    #[serde(rename = "malformedXML")]
    MalformedXml,
    #[serde(rename = "serverError")]
    ServerError,
    #[serde(rename = "clientError")]
    ClientError,
    #[serde(rename = "timeoutEvent")]
    Timeout,
}

impl EventStatus {
    pub fn kind(self) -> EventKind {
        match self {
            EventStatus::Begin
            | EventStatus::Complete
            | EventStatus::Success
            | EventStatus::Timeout => EventKind::Event,
            _ => EventKind::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Begin => "begin",
            EventStatus::Complete => "complete",
            EventStatus::Success => "success",
            EventStatus::HttpError => "httpError",
            EventStatus::EmptyResponse => "emptyResponse",
            EventStatus::MalformedXml => "malformedXML",
            EventStatus::ServerError => "serverError",
            EventStatus::ClientError => "clientError",
            EventStatus::Timeout => "timeoutEvent",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AjaxEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub status: EventStatus,
    pub request_id: RequestId,
    /// Id of the element that triggered the exchange.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_xml: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_error_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AjaxEvent {
    pub fn new(status: EventStatus, request_id: RequestId, source: impl Into<String>) -> Self {
        Self {
            kind: status.kind(),
            status,
            request_id,
            source: source.into(),
            response_code: None,
            response_text: None,
            response_xml: None,
            server_error_name: None,
            server_error_message: None,
            description: None,
        }
    }

    pub fn with_response(mut self, code: Option<u16>, text: Option<String>) -> Self {
        self.response_code = code;
        self.response_xml = text
            .as_deref()
            .filter(|t| t.trim_start().starts_with('<'))
            .map(str::to_string);
        self.response_text = text;
        self
    }

    pub fn with_server_error(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.server_error_name = Some(name.into());
        self.server_error_message = Some(message.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }
}

pub type Listener = Box<dyn FnMut(&AjaxEvent)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered event and error listener lists.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    on_event: Vec<(ListenerId, Listener)>,
    on_error: Vec<(ListenerId, Listener)>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("on_event", &self.on_event.len())
            .field("on_error", &self.on_error.len())
            .finish()
    }
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    pub fn add_on_event(&mut self, listener: impl FnMut(&AjaxEvent) + 'static) -> ListenerId {
        let id = self.next();
        self.on_event.push((id, Box::new(listener)));
        id
    }

    pub fn add_on_error(&mut self, listener: impl FnMut(&AjaxEvent) + 'static) -> ListenerId {
        let id = self.next();
        self.on_error.push((id, Box::new(listener)));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.on_event.len() + self.on_error.len();
        self.on_event.retain(|(l, _)| *l != id);
        self.on_error.retain(|(l, _)| *l != id);
        before != self.on_event.len() + self.on_error.len()
    }

    pub fn has_error_listeners(&self) -> bool {
        !self.on_error.is_empty()
    }

    /// Deliver to the list matching the event kind, in registration order.
    /// Returns how many listeners saw it.
    fn deliver(&mut self, event: &AjaxEvent) -> usize {
        let list = match event.kind {
            EventKind::Event => &mut self.on_event,
            EventKind::Error => &mut self.on_error,
        };
        for (_, listener) in list.iter_mut() {
            listener(event);
        }
        list.len()
    }
}

/// Fans lifecycle events out to global listeners, per-request listeners and
/// channel subscribers.
pub struct EventBroadcaster {
    stage: ProjectStage,
    listeners: Listeners,
    subscribers: Vec<Sender<AjaxEvent>>,
    fallback: Listener,
}

fn log_unhandled(event: &AjaxEvent) {
    log::error!(
        target: "ajax.events",
        "unhandled {} for request {} from {:?}: {}",
        event.status.as_str(),
        event.request_id,
        event.source,
        event
            .server_error_message
            .as_deref()
            .or(event.description.as_deref())
            .unwrap_or("no details"),
    );
}

impl EventBroadcaster {
    pub fn new(stage: ProjectStage) -> Self {
        Self {
            stage,
            listeners: Listeners::new(),
            subscribers: Vec::new(),
            fallback: Box::new(log_unhandled),
        }
    }

    pub fn stage(&self) -> ProjectStage {
        self.stage
    }

    pub fn listeners_mut(&mut self) -> &mut Listeners {
        &mut self.listeners
    }

    /// Replace the notification used for errors nobody listens to.
    pub fn set_fallback(&mut self, fallback: impl FnMut(&AjaxEvent) + 'static) {
        self.fallback = Box::new(fallback);
    }

    /// A channel receiving every event of both kinds.
    pub fn subscribe(&mut self) -> Receiver<AjaxEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn broadcast(&mut self, event: &AjaxEvent, request_listeners: Option<&mut Listeners>) {
        log::debug!(
            target: "ajax.events",
            "event {} for request {}",
            event.status.as_str(),
            event.request_id
        );
        let mut handled = 0;
        if let Some(local) = request_listeners {
            handled += local.deliver(event);
        }
        handled += self.listeners.deliver(event);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());

        if event.is_error() && handled == 0 && !self.stage.is_production() {
            (self.fallback)(event);
        }
    }
}
