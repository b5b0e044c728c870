use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method};

use super::{ProxyRequest, ProxyResponse};
use crate::error::ProxyError;

/// 网络访问；非 2xx 也算成功返回，只有网络失败才是 Err
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ProxyError::Network(e.to_string()))?;
        let response = self
            .client
            .request(method, request.url.clone())
            .send()
            .await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        debug!("{} {} -> {} ({} 字节)", request.method, request.url, status, body.len());
        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}
