use crate::document::Document;
use crate::store::{BulkIndexRequest, BulkResponse, CreateIndexResponse, DocumentStore, StoreError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Elasticsearch / OpenSearch store speaking the REST API over HTTP.
#[derive(Clone)]
pub struct ElasticsearchStore {
    client: Client,
    /// Base URL of the cluster, e.g. "http://localhost:9200".
    base_url: String,
    credentials: Option<(String, String)>,
}

/// Connection settings for [`ElasticsearchStore`].
#[derive(Clone, Debug)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl ElasticsearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ElasticsearchConfig {
            url: url.into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ElasticsearchStore {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport)?;

        let credentials = config
            .username
            .map(|user| (user, config.password.unwrap_or_default()));

        Ok(ElasticsearchStore {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn index_url(&self, index: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(index))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct BulkBody {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let resp = self
            .authorize(self.client.head(self.index_url(index)))
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(resp).await),
        }
    }

    async fn create_index(&self, index: &str) -> Result<CreateIndexResponse, StoreError> {
        let resp = self
            .authorize(self.client.put(self.index_url(index)))
            .send()
            .await
            .map_err(transport)?;

        if resp.status().is_success() {
            return resp.json::<CreateIndexResponse>().await.map_err(transport);
        }

        let status = resp.status();
        let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        let already_exists = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error.kind == "resource_already_exists_exception")
            .unwrap_or(false);

        if status == StatusCode::BAD_REQUEST && already_exists {
            Err(StoreError::IndexAlreadyExists(index.to_string()))
        } else {
            Err(StoreError::Status {
                status: status.as_u16(),
                body: text,
            })
        }
    }

    async fn index_document(&self, index: &str, document: &Document) -> Result<(), StoreError> {
        let url = format!("{}/_doc", self.index_url(index));
        let resp = self
            .authorize(self.client.post(&url))
            .json(document)
            .send()
            .await
            .map_err(transport)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(status_error(resp).await)
        }
    }

    async fn bulk(&self, requests: &[BulkIndexRequest]) -> Result<BulkResponse, StoreError> {
        let body = bulk_body(requests)?;

        let url = format!("{}/_bulk", self.base_url);
        let resp = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let parsed: BulkBody = resp.json().await.map_err(transport)?;
        if parsed.errors {
            let failed: Vec<&serde_json::Value> = parsed
                .items
                .iter()
                .filter_map(|item| item.get("index"))
                .filter_map(|action| action.get("error"))
                .collect();
            return Err(StoreError::BulkItems {
                failed: failed.len(),
                first: failed
                    .first()
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
            });
        }

        Ok(BulkResponse {
            items: parsed.items.len(),
            took_ms: parsed.took,
        })
    }
}

/// Newline-delimited bulk body: one `index` action line followed by the
/// document source, per request.
pub fn bulk_body(requests: &[BulkIndexRequest]) -> Result<String, StoreError> {
    let mut body = String::new();
    for request in requests {
        let action = serde_json::json!({ "index": { "_index": request.index } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&request.document)?);
        body.push('\n');
    }
    Ok(body)
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

async fn status_error(resp: Response) -> StoreError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
    StoreError::Status { status, body }
}
