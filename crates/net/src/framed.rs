use crate::payload::target_url;
use crate::{
    CancelToken, Exchange, PayloadValue, Transport, TransportCallback, TransportError,
    TransportEvent, build_client, read_response,
};
use reqwest::blocking::multipart::{Form, Part};
use std::thread;

/// Multipart exchange for payloads carrying files. Header markers are also
/// sent as payload fields since framed submissions cannot rely on headers.
#[derive(Clone, Debug, Default)]
pub struct FramedTransport {
    client: Option<reqwest::blocking::Client>,
}

impl FramedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self {
            client: Some(client),
        }
    }
}

fn multipart_form(exchange: &Exchange) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for (name, value) in &exchange.headers {
        form = form.text(name.clone(), value.clone());
    }
    for (name, value) in &exchange.fields {
        form = match value {
            PayloadValue::Text(text) => form.text(name.clone(), text.clone()),
            PayloadValue::File {
                file_name,
                content_type,
                bytes,
            } => {
                let mut part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(ct) = content_type {
                    part = part
                        .mime_str(ct)
                        .map_err(|e| TransportError::Client(e.to_string()))?;
                }
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}

impl Transport for FramedTransport {
    fn name(&self) -> &'static str {
        "framed"
    }

    fn send(&self, exchange: Exchange, cancel: CancelToken, cb: TransportCallback) {
        let client = self.client.clone();
        thread::spawn(move || {
            let request_id = exchange.request_id;
            log::trace!(target: "ajax.net", "framed send {request_id} to {}", exchange.url);
            let result = (|| -> Result<reqwest::blocking::Response, TransportError> {
                let client = match client {
                    Some(c) => c,
                    None => build_client()?,
                };
                let url = target_url(&exchange)?;
                let mut req = client.post(url).multipart(multipart_form(&exchange)?);
                for (name, value) in &exchange.headers {
                    req = req.header(name.as_str(), value.as_str());
                }
                req.send().map_err(|e| TransportError::Network(e.to_string()))
            })();

            let event = match result {
                Ok(resp) => read_response(request_id, resp, &cancel),
                Err(error) => Some(TransportEvent::Failed { request_id, error }),
            };
            match event {
                Some(event) if !cancel.is_cancelled() => cb(event),
                _ => log::debug!(target: "ajax.net", "dropping result of cancelled request {request_id}"),
            }
        });
    }
}
