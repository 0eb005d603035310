//! Transports for partial exchanges.
//!
//! Every transport sends on its own worker thread and reports exactly one
//! [`TransportEvent`] through the callback, unless the exchange was cancelled
//! first, in which case it reports nothing.
use core_types::RequestId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

mod direct;
mod framed;
pub mod payload;
pub mod replay;

pub use direct::DirectTransport;
pub use framed::FramedTransport;
pub use replay::ReplayTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// One outgoing partial exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    pub request_id: RequestId,
    pub url: String,
    pub method: Method,
    pub fields: Vec<(String, PayloadValue)>,
    pub headers: Vec<(String, String)>,
}

impl Exchange {
    pub fn has_files(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, v)| matches!(v, PayloadValue::File { .. }))
    }

    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|(k, v)| match v {
            PayloadValue::Text(t) if k == name => Some(t.as_str()),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("client build error: {0}")]
    Client(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded {code} {text}")]
    Status {
        code: u16,
        text: String,
        body: Option<String>,
    },
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Completed {
        request_id: RequestId,
        response: Response,
    },
    Failed {
        request_id: RequestId,
        error: TransportError,
    },
}

impl TransportEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            TransportEvent::Completed { request_id, .. }
            | TransportEvent::Failed { request_id, .. } => *request_id,
        }
    }
}

pub type TransportCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Shared abort flag for one exchange.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait Transport {
    fn name(&self) -> &'static str;

    fn send(&self, exchange: Exchange, cancel: CancelToken, cb: TransportCallback);
}

/// Exchanges carrying files need the framed transport; everything else goes
/// direct.
pub fn select_transport<'a>(
    exchange: &Exchange,
    direct: &'a dyn Transport,
    framed: &'a dyn Transport,
) -> &'a dyn Transport {
    if exchange.has_files() { framed } else { direct }
}

/// Drive a blocking response to completion, honouring `cancel` between
/// chunks. Shared by the reqwest-backed transports.
pub(crate) fn read_response(
    request_id: RequestId,
    resp: reqwest::blocking::Response,
    cancel: &CancelToken,
) -> Option<TransportEvent> {
    use std::io::Read;

    let status = resp.status();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let mut body = tools::utf8::Utf8Stream::with_capacity(16 * 1024);
    let mut reader = resp;
    let mut buf = [0u8; 32 * 1024];
    loop {
        if cancel.is_cancelled() {
            log::debug!(target: "ajax.net", "request {request_id} cancelled while reading");
            return None;
        }
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => body.push(&buf[..n]),
            Err(e) => {
                return Some(TransportEvent::Failed {
                    request_id,
                    error: TransportError::Network(e.to_string()),
                });
            }
        }
    }
    let body = body.finish();

    if !status.is_success() {
        return Some(TransportEvent::Failed {
            request_id,
            error: TransportError::Status {
                code: status.as_u16(),
                text: status.canonical_reason().unwrap_or("").to_string(),
                body: (!body.is_empty()).then_some(body),
            },
        });
    }
    Some(TransportEvent::Completed {
        request_id,
        response: Response {
            status: status.as_u16(),
            content_type,
            body,
        },
    })
}

pub(crate) fn build_client() -> Result<reqwest::blocking::Client, TransportError> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("partial-page/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TransportError::Client(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(fields: Vec<(String, PayloadValue)>) -> Exchange {
        Exchange {
            request_id: 1,
            url: "http://localhost/app".into(),
            method: Method::Post,
            fields,
            headers: Vec::new(),
        }
    }

    #[test]
    fn file_fields_select_the_framed_transport() {
        let direct = ReplayTransport::new();
        let framed = FramedTransport::new();
        let plain = exchange(vec![("a".into(), PayloadValue::Text("1".into()))]);
        assert_eq!(select_transport(&plain, &direct, &framed).name(), "replay");

        let upload = exchange(vec![(
            "f".into(),
            PayloadValue::File {
                file_name: "a.txt".into(),
                content_type: None,
                bytes: b"x".to_vec(),
            },
        )]);
        assert_eq!(select_transport(&upload, &direct, &framed).name(), "framed");
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn text_field_skips_files() {
        let ex = exchange(vec![
            (
                "a".into(),
                PayloadValue::File {
                    file_name: "x".into(),
                    content_type: None,
                    bytes: Vec::new(),
                },
            ),
            ("a".into(), PayloadValue::Text("t".into())),
        ]);
        assert_eq!(ex.text_field("a"), Some("t"));
        assert_eq!(ex.text_field("b"), None);
    }
}
