//! 静态资源离线缓存代理
//!
//! 拦截本进程对静态资源的请求：命中缓存时立即返回并在后台刷新，
//! 未命中时走网络并写入缓存，离线时回退到入口文档或 503。
//! 补全接口与 API 域名的请求不经过缓存。

use bytes::Bytes;
use reqwest::Url;

use crate::error::ProxyError;

pub mod cache;
pub mod fetch;
pub mod worker;

pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use fetch::{Fetcher, HttpFetcher};
pub use worker::CacheProxy;

/// 请求模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// 整页导航
    Navigate,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
}

impl ProxyRequest {
    pub fn new(method: &str, url: &str, mode: RequestMode) -> Result<Self, ProxyError> {
        let url = Url::parse(url).map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self {
            method: method.to_ascii_uppercase(),
            url,
            mode,
        })
    }

    pub fn get(url: &str) -> Result<Self, ProxyError> {
        Self::new("GET", url, RequestMode::Other)
    }

    pub fn navigate(url: &str) -> Result<Self, ProxyError> {
        Self::new("GET", url, RequestMode::Navigate)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// 缓存键：方法 + 去掉片段的 URL
    pub fn key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 离线且无缓存时的响应
    pub fn unavailable() -> Self {
        Self {
            status: 503,
            headers: vec![(
                "content-type".into(),
                "text/plain; charset=utf-8".into(),
            )],
            body: Bytes::from_static("离线状态".as_bytes()),
        }
    }
}
