//! Meilisearch over HTTP.

use crate::error::{ErrorKind, Result};
use crate::{SearchIndex, TaskId};
use async_trait::async_trait;
use booksing_extract::models::Book;
use exn::ResultExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::UtcOffset;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

const PRIMARY_KEY: &str = "Hash";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    uid: &'a str,
    #[serde(rename = "primaryKey")]
    primary_key: &'a str,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    limit: usize,
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Book>,
}

#[derive(Debug, Deserialize)]
struct TaskSummary {
    #[serde(rename = "taskUid")]
    task_uid: TaskId,
}

#[derive(Debug, Deserialize)]
struct TaskError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Task {
    uid: TaskId,
    status: TaskStatus,
    error: Option<TaskError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

/// A Meilisearch index whose documents are [`Book`]s keyed by `Hash`.
#[derive(Debug, Clone)]
pub struct MeiliIndex {
    client: reqwest::Client,
    host: String,
    index: String,
    key: Option<String>,
    task_timeout: Duration,
    utc_offset: UtcOffset,
}

/// Copies of `books` with `Added` expressed in `offset`, so the indexed
/// `YYYY-MM-DD` prefix is the local calendar day.
fn localized(books: &[Book], offset: UtcOffset) -> Vec<Book> {
    books
        .iter()
        .map(|book| Book {
            added: book.added.to_offset(offset),
            ..book.clone()
        })
        .collect()
}

impl MeiliIndex {
    /// Connect to `host` and make sure `index` exists with `Hash` as its
    /// primary key. An index that already exists is reused as-is.
    #[instrument(skip(key))]
    pub async fn connect(host: &str, index: &str, key: Option<&str>) -> Result<Self> {
        let meili = Self {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            index: index.to_string(),
            key: key.filter(|k| !k.is_empty()).map(str::to_string),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            utc_offset: UtcOffset::UTC,
        };
        let request = CreateIndexRequest {
            uid: &meili.index,
            primary_key: PRIMARY_KEY,
        };
        let response = meili.send(meili.client.post(meili.url("/indexes")).json(&request)).await?;
        let summary: TaskSummary = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
        match meili.wait_for(summary.task_uid).await {
            Ok(()) => {},
            Err(err) if matches!(&*err, ErrorKind::TaskFailed { reason, .. } if reason.contains("already exists")) => {
                debug!(index = %meili.index, "index already exists");
            },
            Err(err) => return Err(err),
        }
        Ok(meili)
    }

    /// How long `batch_upsert(.., wait: true)` polls before giving up.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Index `Added` timestamps, and start the recency scan, in `offset`
    /// rather than UTC.
    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn index_url(&self, path: &str) -> String {
        format!("{}/indexes/{}{}", self.host, self.index, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match &self.key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        let response = request.send().await.or_raise(|| ErrorKind::Unavailable)?;
        let status = response.status();
        if status.is_server_error() {
            exn::bail!(ErrorKind::Unavailable);
        }
        if status.is_client_error() && status != StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            exn::bail!(ErrorKind::Rejected(format!("{status}: {body}")));
        }
        Ok(response)
    }

    /// Poll the task every 100ms until it is no longer enqueued or processing.
    #[instrument(level = "debug", skip(self))]
    async fn wait_for(&self, uid: TaskId) -> Result<()> {
        let deadline = Instant::now() + self.task_timeout;
        loop {
            let response = self.send(self.client.get(self.url(&format!("/tasks/{uid}")))).await?;
            let task: Task = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
            match task.status {
                TaskStatus::Succeeded => return Ok(()),
                TaskStatus::Failed | TaskStatus::Canceled => {
                    let error = task.error.unwrap_or(TaskError {
                        code: String::new(),
                        message: String::new(),
                    });
                    exn::bail!(ErrorKind::TaskFailed {
                        uid: task.uid,
                        status: format!("{:?}", task.status).to_lowercase(),
                        reason: format!("{} {}", error.code, error.message).trim().to_string(),
                    });
                },
                TaskStatus::Enqueued | TaskStatus::Processing => {},
            }
            if Instant::now() >= deadline {
                exn::bail!(ErrorKind::Timeout(uid));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl SearchIndex for MeiliIndex {
    fn name(&self) -> &str {
        &self.index
    }

    fn utc_offset(&self) -> UtcOffset {
        self.utc_offset
    }

    #[instrument(level = "debug", skip(self, books), fields(index = %self.index, count = books.len()))]
    async fn batch_upsert(&self, books: &[Book], wait: bool) -> Result<TaskId> {
        let url = self.index_url(&format!("/documents?primaryKey={PRIMARY_KEY}"));
        let documents = localized(books, self.utc_offset);
        let response = self.send(self.client.post(url).json(&documents)).await?;
        let summary: TaskSummary = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
        if wait {
            self.wait_for(summary.task_uid).await?;
        }
        Ok(summary.task_uid)
    }

    async fn query(&self, text: &str, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let request = SearchRequest { q: text, limit, offset };
        let response = self.send(self.client.post(self.index_url("/search")).json(&request)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(index = %self.index, "search index does not exist");
            return Ok(Vec::new());
        }
        let results: SearchResponse = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
        Ok(results.hits)
    }

    async fn get(&self, hash: &str) -> Result<Option<Book>> {
        let response = self.send(self.client.get(self.index_url(&format!("/documents/{hash}")))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let book: Book = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
        Ok(Some(book))
    }

    #[instrument(level = "debug", skip(self), fields(index = %self.index))]
    async fn delete(&self, hash: &str) -> Result<()> {
        // 202 with a task for known and unknown documents alike.
        self.send(self.client.delete(self.index_url(&format!("/documents/{hash}")))).await?;
        Ok(())
    }
}
