//! Response envelope and success assertion.
//!
//! # Design
//! Every call yields an `Envelope` of status and parsed body. `assert_success`
//! turns a non-2xx envelope into a `BackendError` that keeps the `id` the
//! backend reported, so a conflict can be resolved to the existing record.
//! `into_upsert` does exactly that resolution and returns an explicit
//! `Upsert` instead of an error for the "already exists" case.

use serde_json::Value;

use crate::error::{BackendError, Error};
use crate::types::id_string;

pub const CONFLICT: u16 = 409;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status: u16,
    pub body: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `body.id` as a string, when present.
    pub fn body_id(&self) -> Option<String> {
        self.body.get("id").and_then(id_string)
    }

    /// Return the body of a 2xx response, or fail with a `BackendError`.
    pub fn assert_success(self) -> Result<Value, Error> {
        if self.is_success() {
            return Ok(self.body);
        }
        Err(BackendError {
            status: self.status,
            conflicting_id: self.body_id(),
            body: self.body,
        }
        .into())
    }

    /// Resolve a create response: 2xx is `Created`, a 409 carrying an id is
    /// `AlreadyExists`, anything else is an error.
    pub fn into_upsert(self) -> Result<Upsert<Value>, Error> {
        match self.assert_success() {
            Ok(body) => Ok(Upsert::Created(body)),
            Err(Error::Backend(BackendError {
                status: CONFLICT,
                conflicting_id: Some(id),
                ..
            })) => Ok(Upsert::AlreadyExists(id)),
            Err(err) => Err(err),
        }
    }
}

/// Outcome of an idempotent create.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert<T> {
    Created(T),
    /// The backend already held a record with the same key; carries its id.
    AlreadyExists(String),
}

impl<T> Upsert<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }
}

impl Upsert<Value> {
    /// Id of the created or existing record.
    pub fn into_id(self) -> Result<String, Error> {
        match self {
            Upsert::AlreadyExists(id) => Ok(id),
            Upsert::Created(body) => body
                .get("id")
                .and_then(id_string)
                .ok_or_else(|| Error::UnexpectedBody("created record has no id".to_string())),
        }
    }
}
