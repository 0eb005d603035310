use crate::payload::{encode_form, target_url};
use crate::{
    CancelToken, Exchange, Method, Transport, TransportCallback, TransportError, TransportEvent,
    build_client, read_response,
};
use std::thread;

/// Plain request/response exchange with custom headers.
#[derive(Clone, Debug, Default)]
pub struct DirectTransport {
    client: Option<reqwest::blocking::Client>,
}

impl DirectTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self {
            client: Some(client),
        }
    }
}

fn exchange_once(
    client: Option<reqwest::blocking::Client>,
    exchange: &Exchange,
    cancel: &CancelToken,
) -> Option<TransportEvent> {
    let request_id = exchange.request_id;
    let result = (|| -> Result<reqwest::blocking::Response, TransportError> {
        let client = match client {
            Some(c) => c,
            None => build_client()?,
        };
        let url = target_url(exchange)?;
        let mut req = match exchange.method {
            Method::Get => client.get(url),
            Method::Post => client
                .post(url)
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded;charset=UTF-8",
                )
                .body(encode_form(&exchange.fields)),
        };
        for (name, value) in &exchange.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req.send().map_err(|e| TransportError::Network(e.to_string()))
    })();

    match result {
        Ok(resp) => read_response(request_id, resp, cancel),
        Err(error) => Some(TransportEvent::Failed { request_id, error }),
    }
}

impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn send(&self, exchange: Exchange, cancel: CancelToken, cb: TransportCallback) {
        let client = self.client.clone();
        thread::spawn(move || {
            log::trace!(target: "ajax.net", "direct send {} to {}", exchange.request_id, exchange.url);
            let event = exchange_once(client, &exchange, &cancel);
            match event {
                Some(event) if !cancel.is_cancelled() => cb(event),
                _ => log::debug!(
                    target: "ajax.net",
                    "dropping result of cancelled request {}",
                    exchange.request_id
                ),
            }
        });
    }
}
