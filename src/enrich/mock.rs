// src/enrich/mock.rs
//! Deterministic backend for tests and local runs. Scripted responses are
//! consumed first; afterwards every call yields a canned summary.
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::enrich::SummaryBackend;
use crate::error::BackendError;

#[derive(Default)]
pub struct MockBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next call.
    pub fn push(&self, result: Result<String, BackendError>) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(result);
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }
}

fn canned(prompt: &str, document: &str) -> String {
    let head: String = prompt.chars().take(40).collect();
    format!(
        "[mock summary] {head} ({} chars of source)",
        document.chars().count()
    )
}

#[async_trait]
impl SummaryBackend for MockBackend {
    async fn summarize(&self, prompt: &str, document: &str) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(prompt.to_string());
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or_else(|| Ok(canned(prompt, document)))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
