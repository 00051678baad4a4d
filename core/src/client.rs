//! The client facade.
//!
//! # Design
//! `CrmClient` pairs a `Transport` with the logging span it was given at
//! construction and implements `Backend`. All resource operations reach it
//! through the extension traits re-exported from the crate root. The client
//! keeps no state between calls; every record lives in the backend.

use serde_json::Value;
use tracing::Span;

use crate::backend::{log_conflict, Backend};
use crate::config::ClientConfig;
use crate::envelope::Envelope;
use crate::error::Error;
use crate::http::{HttpExecutor, HttpMethod, UreqExecutor};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct CrmClient<E = UreqExecutor> {
    transport: Transport<E>,
    span: Span,
    log_conflicts: bool,
}

impl CrmClient<UreqExecutor> {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_executor(config, UreqExecutor::new(config.timeout))
    }
}

impl<E: HttpExecutor> CrmClient<E> {
    pub fn with_executor(config: &ClientConfig, executor: E) -> Self {
        let transport = Transport::with_executor(config, executor);
        let span = tracing::info_span!("crm_client", base_url = %transport.base_url());
        Self {
            transport,
            span,
            log_conflicts: config.log_conflicts,
        }
    }

    /// Replace the span all client events are recorded in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn transport(&self) -> &Transport<E> {
        &self.transport
    }

    pub fn executor(&self) -> &E {
        self.transport.executor()
    }
}

impl<E: HttpExecutor> Backend for CrmClient<E> {
    fn send(
        &self,
        method: HttpMethod,
        path: &str,
        payload: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Envelope, Error> {
        let _entered = self.span.enter();
        self.transport.send(method, path, payload, query)
    }

    fn logs_conflicts(&self) -> bool {
        self.log_conflicts
    }

    fn note_conflict(&self, resource: &'static str, id: &str) {
        self.span
            .in_scope(|| log_conflict(self.log_conflicts, resource, id));
    }
}
