//! HTTP client for the semantic search collaborator
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Wire format:
//! `POST {base_url}/rank` with `{"query", "candidate_ids", "limit"}`,
//! answered by `{"results": [{"user_id", "score"}]}` best first.

use async_trait::async_trait;
use beacon_common::UserId;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::{SearchError, SearchResult},
    SearchHit, SemanticSearchClient,
};

#[derive(Debug, Serialize)]
struct RankRequest<'a> {
    query: &'a str,
    candidate_ids: &'a [UserId],
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct RankResponse {
    results: Vec<SearchHit>,
}

/// `reqwest` backed [`SemanticSearchClient`]
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSearchClient {
    pub fn new(base_url: &str) -> SearchResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SearchError::Config(format!(
                "search base url must be http(s), got {base_url:?}"
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("beacon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{base_url}/rank"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SemanticSearchClient for HttpSearchClient {
    #[instrument(level = "debug", skip(self, candidate_ids), fields(candidates = candidate_ids.len()))]
    async fn rank(&self, query: &str, candidate_ids: &[UserId]) -> SearchResult<Vec<SearchHit>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RankRequest {
                query,
                candidate_ids,
                limit: candidate_ids.len(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: RankResponse =
            serde_json::from_slice(&body).map_err(|e| SearchError::Malformed(e.to_string()))?;

        debug!("🔍 Search service ranked {} candidates", parsed.results.len());
        Ok(parsed.results)
    }
}
