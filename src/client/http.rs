use super::NodeClient;
use crate::error::RpcError;
use crate::node::protocol::*;
use crate::node::types::{NodeId, Record};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// `NodeClient` over HTTP/JSON.
///
/// Requests carry no timeout of their own; callers bound them and drop the future on
/// expiry, which aborts the request and returns the connection to the pool.
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    address: String,
    base_url: String,
    http_client: reqwest::Client,
}

fn transport_error(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout
    } else if e.is_decode() {
        RpcError::Serialization(e.to_string())
    } else {
        RpcError::Transport(e.to_string())
    }
}

impl HttpNodeClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_client(address, reqwest::Client::new())
    }

    /// Shares `http_client`'s connection pool.
    pub fn with_client(address: impl Into<String>, http_client: reqwest::Client) -> Self {
        let address = address.into();
        let trimmed = address.trim_end_matches('/');
        let base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        Self {
            address,
            base_url,
            http_client,
        }
    }

    /// POSTs `body` to `endpoint`. `Ok(None)` means the node answered 404.
    async fn post<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Option<Resp>, RpcError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, endpoint))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            return response.json::<Resp>().await.map(Some).map_err(transport_error);
        }

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&text)
            .map(|body| body.error)
            .unwrap_or(text);

        Err(match status {
            StatusCode::SERVICE_UNAVAILABLE => RpcError::Unavailable,
            s if s.is_client_error() => RpcError::BadRequest(detail),
            s => RpcError::Internal(format!("{}: {}", s, detail)),
        })
    }

    /// Like `post`, for endpoints where 404 is not a legitimate answer.
    async fn post_expect<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        self.post(endpoint, body).await?.ok_or_else(|| {
            RpcError::Internal(format!("{} not found on {}", endpoint, self.address))
        })
    }

    async fn post_empty(&self, endpoint: &str) -> Result<(), RpcError> {
        let _: AckResponse = self
            .post_expect(endpoint, &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get(&self, key: &str, fields: &[String]) -> Result<Option<Record>, RpcError> {
        let req = GetRequest {
            key: key.to_string(),
            fields: fields.to_vec(),
        };
        let resp: Option<GetResponse> = self.post(ENDPOINT_GET, &req).await?;
        Ok(resp.map(|r| r.value))
    }

    async fn get_backup(
        &self,
        origin: NodeId,
        key: &str,
        fields: &[String],
    ) -> Result<Option<Record>, RpcError> {
        let req = GetBackupRequest {
            origin_node_id: origin,
            key: key.to_string(),
            fields: fields.to_vec(),
        };
        let resp: Option<GetResponse> = self.post(ENDPOINT_GET_BACKUP, &req).await?;
        Ok(resp.map(|r| r.value))
    }

    async fn set(
        &self,
        key: &str,
        value: &Record,
        backup: Option<NodeId>,
    ) -> Result<usize, RpcError> {
        let req = SetRequest {
            key: key.to_string(),
            value: value.clone(),
            backup_node: backup,
        };
        let resp: SizeResponse = self.post_expect(ENDPOINT_SET, &req).await?;
        Ok(resp.size)
    }

    async fn set_backup(
        &self,
        origin: NodeId,
        key: &str,
        value: &Record,
    ) -> Result<usize, RpcError> {
        let req = SetBackupRequest {
            origin_node_id: origin,
            key: key.to_string(),
            value: value.clone(),
        };
        let resp: SizeResponse = self.post_expect(ENDPOINT_SET_BACKUP, &req).await?;
        Ok(resp.size)
    }

    async fn push_update(
        &self,
        origin: NodeId,
        key: &str,
        value: &Record,
        access_count: u64,
    ) -> Result<(), RpcError> {
        let req = PushUpdateRequest {
            origin_node_id: origin,
            key: key.to_string(),
            value: value.clone(),
            access_count,
        };
        let _: AckResponse = self.post_expect(ENDPOINT_PUSH_UPDATE, &req).await?;
        Ok(())
    }

    async fn fail(&self) -> Result<(), RpcError> {
        self.post_empty(ENDPOINT_FAIL).await
    }

    async fn recover(&self) -> Result<(), RpcError> {
        self.post_empty(ENDPOINT_RECOVER).await
    }

    async fn ping(&self) -> Result<(), RpcError> {
        self.post_empty(ENDPOINT_PING).await
    }

    async fn new_node(&self, request: &NewNodeRequest) -> Result<(), RpcError> {
        let _: AckResponse = self.post_expect(ENDPOINT_NEW_NODE, request).await?;
        Ok(())
    }
}
