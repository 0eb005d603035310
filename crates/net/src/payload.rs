//! Payload encodings for partial exchanges.
use crate::{Exchange, Method, PayloadValue, TransportError};
use url::Url;
use url::form_urlencoded;

/// `application/x-www-form-urlencoded` body of the text fields. File fields
/// contribute nothing.
pub fn encode_form(fields: &[(String, PayloadValue)]) -> String {
    let mut ser = form_urlencoded::Serializer::new(String::new());
    for (name, value) in fields {
        if let PayloadValue::Text(text) = value {
            ser.append_pair(name, text);
        }
    }
    ser.finish()
}

/// Target URL of the exchange. For `GET` the encoded fields are appended to
/// the query, keeping any query the action already had.
pub fn target_url(exchange: &Exchange) -> Result<Url, TransportError> {
    let mut url = Url::parse(&exchange.url).map_err(|e| TransportError::InvalidUrl {
        url: exchange.url.clone(),
        reason: e.to_string(),
    })?;
    if exchange.method == Method::Get {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &exchange.fields {
            if let PayloadValue::Text(text) = value {
                pairs.append_pair(name, text);
            }
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_encoding_escapes_and_skips_files() {
        let fields = vec![
            ("javax.faces.source".to_string(), PayloadValue::Text("f:go".into())),
            ("q".to_string(), PayloadValue::Text("a b&c".into())),
            (
                "upload".to_string(),
                PayloadValue::File {
                    file_name: "a".into(),
                    content_type: None,
                    bytes: vec![1],
                },
            ),
        ];
        assert_eq!(encode_form(&fields), "javax.faces.source=f%3Ago&q=a+b%26c");
    }

    #[test]
    fn get_appends_fields_to_existing_query() {
        let exchange = Exchange {
            request_id: 1,
            url: "http://h/app?x=1".into(),
            method: Method::Get,
            fields: vec![("y".into(), PayloadValue::Text("2".into()))],
            headers: Vec::new(),
        };
        assert_eq!(target_url(&exchange).unwrap().as_str(), "http://h/app?x=1&y=2");
    }

    #[test]
    fn relative_urls_are_rejected() {
        let exchange = Exchange {
            request_id: 1,
            url: "/app".into(),
            method: Method::Post,
            fields: Vec::new(),
            headers: Vec::new(),
        };
        assert!(matches!(
            target_url(&exchange),
            Err(TransportError::InvalidUrl { .. })
        ));
    }
}
