//! Canned-response transport for replaying recorded exchanges.
use crate::{CancelToken, Exchange, Response, Transport, TransportCallback, TransportError, TransportEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct ReplayState {
    answers: VecDeque<Option<Result<Response, TransportError>>>,
    sent: Vec<Exchange>,
}

/// Answers each exchange with the next queued result, on the caller's
/// thread. An exchange with no queued answer (or a [`ReplayTransport::hold`])
/// never completes.
#[derive(Clone, Debug, Default)]
pub struct ReplayTransport {
    state: Arc<Mutex<ReplayState>>,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, answer: Option<Result<Response, TransportError>>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .answers
            .push_back(answer);
    }

    /// Queue a `200 text/xml` answer.
    pub fn respond(&self, body: impl Into<String>) {
        self.push(Some(Ok(Response {
            status: 200,
            content_type: Some("text/xml;charset=UTF-8".to_string()),
            body: body.into(),
        })));
    }

    pub fn respond_with(&self, response: Response) {
        self.push(Some(Ok(response)));
    }

    pub fn fail(&self, error: TransportError) {
        self.push(Some(Err(error)));
    }

    /// The next exchange gets no answer.
    pub fn hold(&self) {
        self.push(None);
    }

    /// Exchanges sent so far, in send order.
    pub fn sent(&self) -> Vec<Exchange> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }
}

impl Transport for ReplayTransport {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn send(&self, exchange: Exchange, cancel: CancelToken, cb: TransportCallback) {
        let request_id = exchange.request_id;
        let answer = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.sent.push(exchange);
            state.answers.pop_front().flatten()
        };
        let Some(answer) = answer else {
            log::trace!(target: "ajax.net", "replay holds request {request_id}");
            return;
        };
        if cancel.is_cancelled() {
            return;
        }
        cb(match answer {
            Ok(response) => TransportEvent::Completed { request_id, response },
            Err(error) => TransportEvent::Failed { request_id, error },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    fn exchange(id: u64) -> Exchange {
        Exchange {
            request_id: id,
            url: "http://h/".into(),
            method: Method::Post,
            fields: Vec::new(),
            headers: Vec::new(),
        }
    }

    #[test]
    fn answers_in_order_and_records_exchanges() {
        let t = ReplayTransport::new();
        t.respond("<a/>");
        t.hold();
        t.fail(TransportError::Network("down".into()));

        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = got.clone();
        let cb: TransportCallback = Arc::new(move |e: TransportEvent| sink.lock().unwrap().push(e));
        for id in 1..=3 {
            t.send(exchange(id), CancelToken::new(), cb.clone());
        }

        let got = got.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].request_id(), 1);
        assert!(matches!(got[1], TransportEvent::Failed { request_id: 3, .. }));
        assert_eq!(t.sent().len(), 3);
    }
}
