//! reqwest-backed implementation of the cloud seams.

use std::time::Duration;

use async_trait::async_trait;
use circuitwatch_core::WriteOutcome;
use reqwest::{Client, RequestBuilder, Response};

use crate::api::{CloudApi, MemberRow, SchemaBackend, StateResponse, UpsertRow};
use crate::error::CloudError;

/// Default per-request timeout (milliseconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 4_000;

pub struct HttpCloudClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCloudClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, CloudError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> WriteOutcome<(), CloudError> {
        let req = self.authorize(self.client.post(self.url(path)).json(&body));
        match req.send().await.map_err(CloudError::from) {
            Ok(resp) => match check_status(resp).await {
                Ok(_) => WriteOutcome::Success(()),
                Err(e) => classify(e),
            },
            Err(e) => classify(e),
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, CloudError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CloudError::Status {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

fn classify(err: CloudError) -> WriteOutcome<(), CloudError> {
    if err.is_transient() {
        WriteOutcome::Transient(err)
    } else {
        WriteOutcome::Terminal(err)
    }
}

#[async_trait]
impl CloudApi for HttpCloudClient {
    async fn fetch_state(&self) -> Result<StateResponse, CloudError> {
        let req = self.authorize(self.client.get(self.url("circuit/state")));
        let resp = check_status(req.send().await?).await?;
        resp.json::<StateResponse>()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))
    }

    async fn fetch_roster(&self, group_id: &str) -> Result<Vec<MemberRow>, CloudError> {
        let path = format!("groups/{}/members", urlencoding::encode(group_id));
        let req = self.authorize(self.client.get(self.url(&path)));
        let resp = check_status(req.send().await?).await?;
        resp.json::<Vec<MemberRow>>()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SchemaBackend for HttpCloudClient {
    async fn ensure_table(&self, table: &str) -> WriteOutcome<(), CloudError> {
        self.post_json("schema/tables", serde_json::json!({ "name": table }))
            .await
    }

    async fn ensure_column(
        &self,
        table: &str,
        column: &str,
        column_type: &str,
    ) -> WriteOutcome<(), CloudError> {
        self.post_json(
            "schema/columns",
            serde_json::json!({ "table": table, "column": column, "type": column_type }),
        )
        .await
    }

    async fn upsert(&self, table: &str, row: &UpsertRow) -> WriteOutcome<(), CloudError> {
        let path = format!("tables/{}/upsert", urlencoding::encode(table));
        let body = serde_json::json!({ "key": row.key, "data": row.data });
        self.post_json(&path, body).await
    }
}
