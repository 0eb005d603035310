//! The engine: queue, transports, interpreter and broadcaster, driven by
//! [`AjaxRuntime::pump`] on the thread that owns the document.
use crate::config::{EngineConfig, RequestOptions};
use crate::queue::RequestQueue;
use crate::request::{Request, RequestError, RequestSpec};
use bus::{AjaxEvent, EventBroadcaster, EventStatus};
use core_types::{RequestId, RequestState};
use html::{Document, ScriptHost};
use net::{
    CancelToken, DirectTransport, FramedTransport, Transport, TransportError, TransportEvent,
    select_transport,
};
use runtime_parse::{ChangeInterpreter, Outcome, ResponseError};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::Instant;
use url::Url;

/// Host navigation, used when a response redirects.
pub trait Navigator {
    fn navigate(&mut self, url: &str);
}

struct Active {
    request: Request,
    cancel: CancelToken,
    deadline: Option<Instant>,
}

pub struct AjaxRuntime {
    config: EngineConfig,
    defaults: RequestOptions,
    base_url: Option<Url>,
    queue: RequestQueue,
    broadcaster: EventBroadcaster,
    interpreter: ChangeInterpreter,
    direct: Box<dyn Transport>,
    framed: Box<dyn Transport>,
    evt_tx: Sender<TransportEvent>,
    evt_rx: Receiver<TransportEvent>,
    active: Option<Active>,
    delayed: Vec<(Instant, Request)>,
    next_id: RequestId,
}

impl AjaxRuntime {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_transports(
            config,
            Box::new(DirectTransport::new()),
            Box::new(FramedTransport::new()),
        )
    }

    pub fn with_transports(
        config: EngineConfig,
        direct: Box<dyn Transport>,
        framed: Box<dyn Transport>,
    ) -> Self {
        let (evt_tx, evt_rx) = channel();
        let base_url = config.base_url.as_deref().and_then(|base| match Url::parse(base) {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!(target: "ajax.request", "ignoring invalid base url {base:?}: {e}");
                None
            }
        });
        Self {
            defaults: config.request_defaults(),
            base_url,
            queue: RequestQueue::new(),
            broadcaster: EventBroadcaster::new(config.project_stage),
            interpreter: ChangeInterpreter::new(
                config.protocol.clone(),
                config.bootstrap_script.clone(),
            ),
            direct,
            framed,
            evt_tx,
            evt_rx,
            active: None,
            delayed: Vec::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn broadcaster_mut(&mut self) -> &mut EventBroadcaster {
        &mut self.broadcaster
    }

    pub fn interpreter(&self) -> &ChangeInterpreter {
        &self.interpreter
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn in_flight(&self) -> Option<RequestId> {
        self.active.as_ref().map(|a| a.request.id())
    }

    /// State of a request the runtime still holds. Finished requests are
    /// dropped and report `None`.
    pub fn state_of(&self, id: RequestId) -> Option<RequestState> {
        if let Some(active) = &self.active
            && active.request.id() == id
        {
            return Some(active.request.state());
        }
        self.queue
            .get(id)
            .or_else(|| self.delayed.iter().map(|(_, r)| r).find(|r| r.id() == id))
            .map(Request::state)
    }

    /// Build a request from `source` and admit it.
    pub fn request(
        &mut self,
        doc: &Document,
        source: &str,
        spec: RequestSpec,
    ) -> Result<RequestId, RequestError> {
        self.request_at(doc, source, spec, Instant::now())
    }

    pub fn request_at(
        &mut self,
        doc: &Document,
        source: &str,
        spec: RequestSpec,
        now: Instant,
    ) -> Result<RequestId, RequestError> {
        let id = self.next_id;
        let request = Request::build(id, doc, source, spec, &self.config.protocol, &self.defaults)?;
        self.next_id += 1;
        self.enqueue(request, now)?;
        Ok(id)
    }

    fn enqueue(&mut self, request: Request, now: Instant) -> Result<(), RequestError> {
        match request.options().delay.filter(|d| !d.is_zero()) {
            Some(delay) => {
                log::debug!(target: "ajax.queue", "request {} delayed by {delay:?}", request.id());
                self.delayed.push((now + delay, request));
                Ok(())
            }
            None => self.admit(request, now),
        }
    }

    fn admit(&mut self, request: Request, now: Instant) -> Result<(), RequestError> {
        let max_depth = request.options().queue_size;
        match self.queue.enqueue(request, max_depth) {
            Some(request) => self.dispatch(request, now),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, mut request: Request, now: Instant) -> Result<(), RequestError> {
        let exchange = match request.exchange(self.base_url.as_ref(), &self.config.protocol) {
            Ok(exchange) => exchange,
            Err(err) => {
                self.broadcast(&mut request, EventStatus::Begin, |e| e);
                request.transition(RequestState::ClientException);
                let description = err.to_string();
                self.broadcast(&mut request, EventStatus::ClientError, |e| {
                    e.with_description(description)
                });
                self.finish(request);
                self.cleanup();
                return Err(err);
            }
        };

        self.broadcast(&mut request, EventStatus::Begin, |e| e);
        request.transition(RequestState::Sending);
        let cancel = CancelToken::new();
        let deadline = request.options().timeout.map(|t| now + t);
        let transport = select_transport(&exchange, self.direct.as_ref(), self.framed.as_ref());
        log::debug!(
            target: "ajax.request",
            "sending request {} via {} to {}",
            request.id(),
            transport.name(),
            exchange.url
        );
        let evt_tx = self.evt_tx.clone();
        transport.send(
            exchange,
            cancel.clone(),
            Arc::new(move |event: TransportEvent| {
                let _ = evt_tx.send(event);
            }),
        );
        self.active = Some(Active {
            request,
            cancel,
            deadline,
        });
        Ok(())
    }

    fn broadcast(
        &mut self,
        request: &mut Request,
        status: EventStatus,
        fill: impl FnOnce(AjaxEvent) -> AjaxEvent,
    ) {
        let event = fill(AjaxEvent::new(status, request.id(), request.source_id()));
        self.broadcaster.broadcast(&event, Some(&mut request.listeners));
    }

    /// Fire `complete`, reach `Done` and drop the request.
    fn finish(&mut self, mut request: Request) {
        self.broadcast(&mut request, EventStatus::Complete, |e| e);
        request.transition(RequestState::Done);
    }

    /// Drop every waiting, delayed and in-flight request without events.
    pub fn cleanup(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
        let dropped = self.queue.cleanup() + self.delayed.len();
        self.delayed.clear();
        log::debug!(target: "ajax.queue", "queue cleaned up, {dropped} waiting request(s) dropped");
    }

    fn advance(&mut self, now: Instant) -> Result<(), RequestError> {
        match self.queue.process_queue() {
            Some(next) => self.dispatch(next, now),
            None => {
                log::trace!(target: "ajax.queue", "queue idle");
                Ok(())
            }
        }
    }

    pub fn pump(
        &mut self,
        doc: &mut Document,
        host: &mut dyn ScriptHost,
        nav: &mut dyn Navigator,
    ) -> Result<usize, RequestError> {
        self.pump_at(doc, host, nav, Instant::now())
    }

    /// Admit due delayed requests, then settle timeouts and transport
    /// completions until nothing more can happen at `now`. Returns how many
    /// requests completed.
    pub fn pump_at(
        &mut self,
        doc: &mut Document,
        host: &mut dyn ScriptHost,
        nav: &mut dyn Navigator,
        now: Instant,
    ) -> Result<usize, RequestError> {
        self.admit_delayed(now)?;
        let mut completed = 0;
        loop {
            if let Some(active) = &self.active
                && active.deadline.is_some_and(|d| d <= now)
            {
                self.time_out(now)?;
                completed += 1;
                continue;
            }
            let Ok(event) = self.evt_rx.try_recv() else {
                break;
            };
            if self.in_flight() != Some(event.request_id()) {
                log::warn!(
                    target: "ajax.net",
                    "dropping stale completion for request {}",
                    event.request_id()
                );
                continue;
            }
            let Some(active) = self.active.take() else {
                continue;
            };
            completed += 1;
            self.complete(active.request, event, doc, host, nav, now)?;
        }
        Ok(completed)
    }

    fn admit_delayed(&mut self, now: Instant) -> Result<(), RequestError> {
        if self.delayed.is_empty() {
            return Ok(());
        }
        // Stable sort keeps enqueue order for equal deadlines.
        self.delayed.sort_by_key(|(due, _)| *due);
        let split = self.delayed.partition_point(|(due, _)| *due <= now);
        let due: Vec<_> = self.delayed.drain(..split).collect();
        for (_, request) in due {
            self.admit(request, now)?;
        }
        Ok(())
    }

    fn time_out(&mut self, now: Instant) -> Result<(), RequestError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        active.cancel.cancel();
        let mut request = active.request;
        log::debug!(target: "ajax.request", "request {} timed out", request.id());
        request.transition(RequestState::TimedOut);
        self.broadcast(&mut request, EventStatus::Timeout, |e| e);
        self.finish(request);
        self.advance(now)
    }

    fn complete(
        &mut self,
        mut request: Request,
        event: TransportEvent,
        doc: &mut Document,
        host: &mut dyn ScriptHost,
        nav: &mut dyn Navigator,
        now: Instant,
    ) -> Result<(), RequestError> {
        let mut redirect = None;
        let mut client_error = None;
        match event {
            TransportEvent::Completed { response, .. } => {
                log::debug!(
                    target: "ajax.request",
                    "request {} answered {} ({})",
                    request.id(),
                    response.status,
                    response.content_type.as_deref().unwrap_or("no content type")
                );
                let code = Some(response.status);
                let body = response.body;
                match self.interpreter.process(doc, &body, host) {
                    Ok(outcome) => {
                        request.transition(RequestState::Succeeded);
                        if let Outcome::Redirect(url) = outcome {
                            redirect = Some(url);
                        }
                        self.broadcast(&mut request, EventStatus::Success, |e| {
                            e.with_response(code, Some(body))
                        });
                    }
                    Err(err) => {
                        let status = match &err {
                            ResponseError::Empty => EventStatus::EmptyResponse,
                            ResponseError::Malformed(_) => EventStatus::MalformedXml,
                            ResponseError::ServerError { .. } => EventStatus::ServerError,
                            ResponseError::Patch(_) => EventStatus::ClientError,
                        };
                        let state = if status == EventStatus::ClientError {
                            RequestState::ClientException
                        } else {
                            RequestState::ServerError
                        };
                        request.transition(state);
                        let description = err.to_string();
                        let server_error = match &err {
                            ResponseError::ServerError { name, message } => {
                                Some((name.clone(), message.clone()))
                            }
                            _ => None,
                        };
                        self.broadcast(&mut request, status, |e| {
                            let e = e.with_response(code, Some(body)).with_description(description);
                            match server_error {
                                Some((name, message)) => e.with_server_error(name, message),
                                None => e,
                            }
                        });
                        if status == EventStatus::ClientError {
                            client_error = Some(err);
                        }
                    }
                }
            }
            TransportEvent::Failed { error, .. } => {
                request.transition(RequestState::ServerError);
                let description = error.to_string();
                let (code, text) = match error {
                    TransportError::Status { code, body, .. } => (Some(code), body),
                    _ => (None, None),
                };
                self.broadcast(&mut request, EventStatus::HttpError, |e| {
                    e.with_response(code, text).with_description(description)
                });
            }
        }

        self.finish(request);
        if let Some(url) = redirect {
            log::debug!(target: "ajax.request", "redirecting to {url}");
            nav.navigate(&url);
        }
        self.advance(now)?;
        match client_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
