//! Framework-neutral request, decoupled from the `may_minihttp` buffers so
//! routing and handlers can be tested without a socket.

use crate::error::ServiceError;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: String,
    /// Path without the query string
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// Split `target` (`/path?query`) into path and decoded query parameters
    pub fn new(method: &str, target: &str, body: Vec<u8>) -> Self {
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        let query = url::form_urlencoded::parse(raw_query.as_bytes())
            .into_owned()
            .collect();
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query,
            body,
        }
    }

    /// Query parameter by name; empty values count as absent
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Decode the JSON body; an empty body reads as `{}`
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        let body: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &self.body
        };
        serde_json::from_slice(body).map_err(|e| {
            log::debug!("rejected payload on {} {}: {e}", self.method, self.path);
            ServiceError::invalid(format!("Payload invalido: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default)]
        nome: Option<String>,
    }

    #[test]
    fn test_query_string_is_decoded() {
        let req = ApiRequest::new("get", "/magazzino/movimenti?articoloId=4&from=01%2F05%2F2024&to=", Vec::new());
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/magazzino/movimenti");
        assert_eq!(req.query_param("articoloId"), Some("4"));
        assert_eq!(req.query_param("from"), Some("01/05/2024"));
        assert_eq!(req.query_param("to"), None);
    }

    #[test]
    fn test_empty_body_reads_as_empty_object() {
        let req = ApiRequest::new("POST", "/cantieri", b"  ".to_vec());
        let body: Body = req.json().expect("empty object");
        assert!(body.nome.is_none());
    }

    #[test]
    fn test_malformed_body_is_invalid_argument() {
        let req = ApiRequest::new("POST", "/cantieri", b"{nome:".to_vec());
        match req.json::<Body>() {
            Err(ServiceError::InvalidArgument(msg)) => assert!(msg.starts_with("Payload invalido")),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }
}
