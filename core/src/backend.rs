//! The capability every resource operation is built on.
//!
//! # Design
//! `Backend` is the shared transport-plus-envelope seam. Resource traits
//! (`WebsiteApi`, `ContactApi`, ...) are extension traits with a blanket
//! implementation for every `Backend`, so one client value exposes all
//! resource operations while each resource lives in its own module.

use serde_json::Value;

use crate::envelope::{Envelope, Upsert};
use crate::error::Error;
use crate::http::HttpMethod;

pub trait Backend {
    /// Execute one request. Non-2xx statuses come back as data.
    fn send(
        &self,
        method: HttpMethod,
        path: &str,
        payload: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Envelope, Error>;

    /// Whether recovered conflicts are logged at `info`.
    fn logs_conflicts(&self) -> bool {
        false
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, Error> {
        self.send(HttpMethod::Get, path, None, query)?
            .assert_success()
    }

    fn post(&self, path: &str, payload: &Value) -> Result<Value, Error> {
        self.send(HttpMethod::Post, path, Some(payload), &[])?
            .assert_success()
    }

    fn put(&self, path: &str, payload: &Value) -> Result<Value, Error> {
        self.send(HttpMethod::Put, path, Some(payload), &[])?
            .assert_success()
    }

    /// POST a create payload and resolve a 409-with-id to `AlreadyExists`.
    fn create(&self, path: &str, payload: &Value) -> Result<Upsert<Value>, Error> {
        self.send(HttpMethod::Post, path, Some(payload), &[])?
            .into_upsert()
    }

    /// GET a filtered collection and return its first item, if any.
    fn first_item(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Value>, Error> {
        let mut body = self.get(path, query)?;
        let first = match body.get_mut("items").and_then(Value::as_array_mut) {
            Some(items) if !items.is_empty() => Some(items.swap_remove(0)),
            _ => None,
        };
        Ok(first)
    }

    /// Record that a create hit an existing record.
    fn note_conflict(&self, resource: &'static str, id: &str) {
        log_conflict(self.logs_conflicts(), resource, id);
    }
}

pub(crate) fn log_conflict(verbose: bool, resource: &'static str, id: &str) {
    if verbose {
        tracing::info!(resource, id, "record already exists, reusing it");
    } else {
        tracing::debug!(resource, id, "record already exists, reusing it");
    }
}

/// Extract `id` from a response body.
pub(crate) fn require_id(body: &Value, what: &str) -> Result<String, Error> {
    body.get("id")
        .and_then(crate::types::id_string)
        .ok_or_else(|| Error::UnexpectedBody(format!("{what} response has no id")))
}
