//! In-memory CI service for tests

use crate::fetch::client::{CiService, FetchError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

pub(crate) struct FakeCi {
    base: String,
    responses: HashMap<String, Result<Value, FetchError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCi {
    pub(crate) fn new() -> Self {
        Self {
            base: "https://hydra.example.org".to_string(),
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with(mut self, path: &str, value: Value) -> Self {
        self.responses.insert(path.to_string(), Ok(value));
        self
    }

    pub(crate) fn failing(mut self, path: &str) -> Self {
        let err = FetchError::Transport {
            url: format!("{}{}", self.base, path),
            reason: "timed out".to_string(),
        };
        self.responses.insert(path.to_string(), Err(err));
        self
    }

    /// Register a `/build/{id}` document for `job` built on `system`
    pub(crate) fn with_build(self, id: u64, job: &str, system: &str, status: Option<i64>, ts: i64) -> Self {
        let doc = json!({
            "id": id,
            "job": job,
            "buildstatus": status,
            "timestamp": ts,
            "system": system,
        });
        self.with(&format!("/build/{}", id), doc)
    }

    /// Paths requested so far, in request order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CiService for FakeCi {
    fn base_url(&self) -> &str {
        &self.base
    }

    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(path.to_string());
        self.responses
            .get(path)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    url: format!("{}{}", self.base, path),
                    status: 404,
                })
            })
    }
}
