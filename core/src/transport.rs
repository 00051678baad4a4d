//! Configured HTTP access to the CRM backend.
//!
//! `Transport` owns the base URL, the merged default headers and an
//! `HttpExecutor`. `send` always returns an `Envelope` for any HTTP status;
//! only transport-level failures are errors.

use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::envelope::Envelope;
use crate::error::{Error, TransportError};
use crate::http::{HttpExecutor, HttpMethod, HttpRequest, UreqExecutor};

/// Strip one leading `/` and then one leading `api/` segment, so `/contacts`,
/// `contacts` and `api/contacts` address the same resource.
pub fn normalize_path(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.strip_prefix("api/").unwrap_or(path)
}

/// Default headers merged with the configured extras; the `Authorization`
/// header, when an API key is set, always wins.
fn default_headers(config: &ClientConfig) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = vec![
        ("Accept".to_string(), "application/json".to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ];
    let mut set = |name: &str, value: String| {
        match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => headers.push((name.to_string(), value)),
        }
    };
    for (name, value) in &config.extra_headers {
        set(name, value.clone());
    }
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        set("Authorization", config.auth_scheme.header_value(key));
    }
    headers
}

#[derive(Debug, Clone)]
pub struct Transport<E = UreqExecutor> {
    base_url: String,
    headers: Vec<(String, String)>,
    executor: E,
}

impl Transport<UreqExecutor> {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_executor(config, UreqExecutor::new(config.timeout))
    }
}

impl<E: HttpExecutor> Transport<E> {
    pub fn with_executor(config: &ClientConfig, executor: E) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            headers: default_headers(config),
            executor,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, normalize_path(path))
    }

    /// Describe a request without sending it. Empty payloads and empty
    /// query lists are omitted.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        payload: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<HttpRequest, Error> {
        let body = match payload {
            None => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(value) => Some(serde_json::to_string(value)?),
        };
        Ok(HttpRequest {
            method,
            url: self.url(path),
            headers: self.headers.clone(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        })
    }

    pub fn send(
        &self,
        method: HttpMethod,
        path: &str,
        payload: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Envelope, Error> {
        let request = self.build_request(method, path, payload, query)?;
        tracing::debug!(method = method.as_str(), url = %request.url, "sending request");
        let response = self.executor.execute(&request)?;
        let body = parse_body(&response.body)?;
        tracing::debug!(status = response.status, url = %request.url, "received response");
        Ok(Envelope {
            status: response.status,
            body,
        })
    }
}

/// Empty bodies become an empty object; anything else must be JSON.
pub fn parse_body(raw: &str) -> Result<Value, TransportError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(TransportError::MalformedBody)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthScheme;
    use crate::test_support::ScriptedExecutor;
    use serde_json::json;

    fn transport() -> Transport<ScriptedExecutor> {
        Transport::with_executor(
            &ClientConfig::new("https://crm.example.com/api/"),
            ScriptedExecutor::new(),
        )
    }

    #[test]
    fn path_variants_resolve_to_same_url() {
        let t = transport();
        let expected = "https://crm.example.com/api/contacts";
        assert_eq!(t.url("/contacts"), expected);
        assert_eq!(t.url("contacts"), expected);
        assert_eq!(t.url("api/contacts"), expected);
        assert_eq!(t.url("/api/contacts"), expected);
    }

    #[test]
    fn only_one_prefix_is_stripped() {
        assert_eq!(normalize_path("//contacts"), "/contacts");
        assert_eq!(normalize_path("api/api/contacts"), "api/contacts");
        assert_eq!(normalize_path("apis/contacts"), "apis/contacts");
    }

    #[test]
    fn default_headers_without_key() {
        let t = transport();
        assert_eq!(
            t.headers(),
            &[
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ]
        );
    }

    #[test]
    fn extra_headers_merge_and_auth_wins() {
        let config = ClientConfig::new("http://localhost")
            .api_key("k")
            .auth_scheme(AuthScheme::Token)
            .header("accept", "text/plain")
            .header("X-Site", "demo")
            .header("Authorization", "Basic nope");
        let t = Transport::with_executor(&config, ScriptedExecutor::new());
        let req = t.build_request(HttpMethod::Get, "contacts", None, &[]).unwrap();
        assert_eq!(req.header("Accept"), Some("text/plain"));
        assert_eq!(req.header("x-site"), Some("demo"));
        assert_eq!(req.header("Authorization"), Some("Token k"));
        assert_eq!(req.headers.len(), 4);
    }

    #[test]
    fn empty_payload_is_not_sent() {
        let t = transport();
        let req = t
            .build_request(HttpMethod::Post, "contacts", Some(&json!({})), &[])
            .unwrap();
        assert!(req.body.is_none());
        let req = t
            .build_request(HttpMethod::Post, "contacts", Some(&json!({"a": 1})), &[])
            .unwrap();
        assert_eq!(req.body.as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn non_2xx_is_returned_as_data() {
        let t = transport();
        t.executor().push(500, r#"{"detail":"boom"}"#);
        let envelope = t.send(HttpMethod::Get, "contacts", None, &[]).unwrap();
        assert_eq!(envelope.status, 500);
        assert_eq!(envelope.body["detail"], "boom");
    }

    #[test]
    fn empty_body_becomes_empty_object() {
        let t = transport();
        t.executor().push(204, "");
        let envelope = t.send(HttpMethod::Put, "contacts/1", None, &[]).unwrap();
        assert_eq!(envelope.body, json!({}));
    }

    #[test]
    fn malformed_body_is_transport_error() {
        let t = transport();
        t.executor().push(200, "<html>");
        let err = t.send(HttpMethod::Get, "contacts", None, &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::MalformedBody(_))
        ));
    }

    #[test]
    fn query_is_forwarded() {
        let t = transport();
        t.executor().push(200, r#"{"items":[]}"#);
        t.send(HttpMethod::Get, "/contacts", None, &[("email", "a@example.com")])
            .unwrap();
        let sent = t.executor().requests();
        assert_eq!(sent[0].query, vec![("email".to_string(), "a@example.com".to_string())]);
        assert_eq!(sent[0].url, "https://crm.example.com/api/contacts");
    }
}
