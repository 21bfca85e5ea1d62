//! Elasticsearch-backed search index (REST API over `reqwest`).
//!
//! ## Queries
//!
//! `location` is matched as an exact keyword and each tag contributes one
//! `should` clause against `<tag field>.keyword`, with at least one required.
//! The score therefore grows with the number of shared tags.
//!
//! ## Error Mapping
//!
//! | Response | Result |
//! |----------|--------|
//! | transport failure | `SearchError::Network` |
//! | 404 `index_not_found_exception` on search | empty candidate list |
//! | other non-2xx | `SearchError::Api` |
//! | body that is not a search response | `SearchError::Parse` |

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, instrument};

use jobmatch_core::EntityKind;

use super::{Candidate, SearchError, SearchIndex, READINESS_INDEX};
use crate::config::ElasticConfig;

#[derive(Clone)]
pub struct ElasticsearchIndex {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl core::fmt::Debug for ElasticsearchIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ElasticsearchIndex")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchIndex {
    pub fn new(config: &ElasticConfig) -> Result<Self, SearchError> {
        let base_url = Url::parse(&config.base_url())
            .map_err(|e| SearchError::Network(format!("invalid search url: {e}")))?;
        let client = Client::builder()
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SearchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Network(format!("cannot build path on {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: &JsonValue) -> Result<reqwest::Response, SearchError> {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))
    }

    async fn put_document(&self, index: &str, id: &str, document: &JsonValue) -> Result<(), SearchError> {
        let url = self.url(&[index, "_doc", id])?;
        let resp = self.send(Method::PUT, url, document).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(api_error(status, resp).await);
        }
        Ok(())
    }
}

/// Body of the candidate query.
pub(crate) fn candidate_query(kind: EntityKind, location: &str, tags: &[String], limit: usize) -> JsonValue {
    let tag_field = format!("{}.keyword", kind.tag_field());
    let should: Vec<JsonValue> = tags
        .iter()
        .map(|tag| json!({ "term": { tag_field.as_str(): tag } }))
        .collect();

    json!({
        "size": limit,
        "query": {
            "bool": {
                "filter": [ { "term": { "location.keyword": location } } ],
                "should": should,
                "minimum_should_match": 1
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: JsonValue,
}

/// Turn a `_search` reply into candidates, best score first.
pub(crate) fn candidates_from_response(status: StatusCode, body: &str) -> Result<Vec<Candidate>, SearchError> {
    if status == StatusCode::NOT_FOUND && body.contains("index_not_found_exception") {
        debug!("index does not exist yet; no candidates");
        return Ok(Vec::new());
    }
    if !status.is_success() {
        return Err(SearchError::Api {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let parsed: SearchResponse = serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;

    let mut candidates: Vec<Candidate> = parsed
        .hits
        .hits
        .into_iter()
        .map(|hit| Candidate {
            id: hit.id,
            score: hit.score.unwrap_or(0.0),
            document: hit.source,
        })
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(candidates)
}

async fn api_error(status: StatusCode, resp: reqwest::Response) -> SearchError {
    SearchError::Api {
        status: status.as_u16(),
        body: resp.text().await.unwrap_or_default(),
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    #[instrument(skip(self, document), fields(index = kind.index_name()), err)]
    async fn upsert(&self, kind: EntityKind, id: &str, document: &JsonValue) -> Result<(), SearchError> {
        self.put_document(kind.index_name(), id, document).await
    }

    #[instrument(skip(self, tags), fields(index = kind.index_name(), tags = tags.len()), err)]
    async fn find_candidates(
        &self,
        kind: EntityKind,
        location: &str,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Candidate>, SearchError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.url(&[kind.index_name(), "_search"])?;
        let resp = self
            .send(Method::POST, url, &candidate_query(kind, location, tags, limit))
            .await?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;
        candidates_from_response(status, &body)
    }

    async fn probe(&self) -> Result<(), SearchError> {
        let doc = json!({ "checked_at": Utc::now().to_rfc3339() });
        self.put_document(READINESS_INDEX, "probe", &doc).await
    }
}
