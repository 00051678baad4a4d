//! Scripted executor for unit tests: replays queued responses in order and
//! records every request it receives.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::http::{HttpExecutor, HttpRequest, HttpResponse};
use crate::CrmClient;

#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    responses: RefCell<VecDeque<HttpResponse>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, status: u16, body: &str) {
        self.responses.borrow_mut().push_back(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    /// Parsed JSON body of the `n`th request.
    pub fn body(&self, n: usize) -> serde_json::Value {
        let requests = self.requests.borrow();
        let raw = requests[n].body.as_deref().unwrap_or("{}");
        serde_json::from_str(raw).unwrap()
    }
}

impl HttpExecutor for ScriptedExecutor {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        let response = self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted response for {} {}", request.method.as_str(), request.url));
        Ok(response)
    }
}

pub fn client() -> CrmClient<ScriptedExecutor> {
    CrmClient::with_executor(
        &ClientConfig::new("http://crm.test/api"),
        ScriptedExecutor::new(),
    )
}
