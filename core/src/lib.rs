//! Synchronous client for pushing site data into the CRM backend.
//!
//! # Overview
//! Every write is an idempotent upsert: the client POSTs a record and, when
//! the backend answers `409 Conflict` with the id of an existing record,
//! either reuses that id or updates the existing record. Running the same
//! sync twice therefore never duplicates anything in the CRM.
//!
//! # Design
//! - `Transport` builds plain-data `HttpRequest`s and hands them to an
//!   `HttpExecutor`; `UreqExecutor` is the production executor, tests script
//!   their own. Responses become an `Envelope` of status plus parsed body.
//! - `Backend` is the seam resource operations are written against. The
//!   resource traits in [`resources`] are blanket-implemented for it, so
//!   `CrmClient` exposes all of them.
//! - `CrmClient` holds no state between calls. Its logging span is injected
//!   at construction.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod backend;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod render;
pub mod resources;
pub mod sync;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use backend::Backend;
pub use client::CrmClient;
pub use config::{AuthScheme, ClientConfig, ConfigError, Settings};
pub use envelope::{Envelope, Upsert};
pub use error::{BackendError, Error, TransportError};
pub use http::{HttpExecutor, HttpMethod, HttpRequest, HttpResponse, UreqExecutor};
pub use resources::{
    AttachmentApi, CampaignApi, ContactApi, NewWebsiteUser, SubmissionOutcome, TargetListApi,
    WebformApi, WebsiteApi,
};
pub use sync::{run_cron, SiteExport, SiteSource, SyncReport};
pub use transport::Transport;
pub use types::{
    Campaign, Consent, Consents, Contact, ContactInput, Field, FieldValue, SubmissionValues,
    TargetList, Website, WebsiteUser,
};
