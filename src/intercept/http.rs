//! Plain request/response values passed through the transport.

use serde_json::Value;

use crate::Result;

/// Outgoing body as the host handed it over.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    Json(Value),
    Bytes(Vec<u8>),
}

impl RequestBody {
    /// Structured view of the body.
    pub fn to_json(&self) -> Result<Value> {
        match self {
            RequestBody::Text(text) => Ok(serde_json::from_str(text)?),
            RequestBody::Json(value) => Ok(value.clone()),
            RequestBody::Bytes(bytes) => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(RequestBody::Json(body)),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body,
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, "application/json", body.to_string().into_bytes())
    }

    /// 2xx status
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_to_json() {
        assert_eq!(RequestBody::Text(r#"{"a":1}"#.to_string()).to_json().unwrap(), json!({"a": 1}));
        assert_eq!(RequestBody::Bytes(b"[1]".to_vec()).to_json().unwrap(), json!([1]));
        assert!(RequestBody::Text("nope".to_string()).to_json().is_err());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut response = HttpResponse::new(204, "application/json; charset=utf-8", Vec::new());
        response.headers[0].0 = "Content-Type".to_string();
        assert_eq!(response.content_type(), Some("application/json; charset=utf-8"));
        assert!(response.is_success());
        assert!(!HttpResponse::new(404, "text/plain", Vec::new()).is_success());
    }
}
