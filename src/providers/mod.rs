// src/providers/mod.rs
//
// External collaborator seams. The orchestrator only ever sees these
// traits; concrete adapters live in submodules and tests substitute mocks.

pub mod openai;
pub mod tavily;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// One search result as returned by the search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: Option<String>,
}

/// Structured content pulled from one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub url: String,
    pub content: String,
}

/// Stream of text fragments from the reasoning engine.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchHit>, ProviderError>;

    fn name(&self) -> &str;
}

/// Extraction calls are independent per URL; one failure never implies
/// anything about its siblings.
#[async_trait]
pub trait ExtractProvider: Send + Sync {
    async fn extract(&self, url: &str, prompt: &str) -> Result<Extraction, ProviderError>;
}

/// Single-shot reasoning engine with no internal state.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// One completion call. When `response_schema` is given the engine is
    /// asked for a structured result conforming to it.
    async fn complete(
        &self,
        prompt: &str,
        response_schema: Option<Value>,
    ) -> Result<String, ProviderError>;

    /// One completion call streamed as text fragments.
    async fn complete_stream(&self, prompt: &str) -> Result<TextStream, ProviderError>;
}
