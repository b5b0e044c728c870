use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use reqwest::Url;
use tokio_util::task::TaskTracker;

use super::{CacheStorage, Fetcher, ProxyRequest, ProxyResponse, RequestMode};
use crate::error::ProxyError;
use crate::model::openai::COMPLETION_PATH;

/// 请求的路由方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// 直接走网络，不经过缓存
    Bypass,
    /// 缓存优先，后台刷新
    Cache,
}

/// 判断请求是否属于补全接口或 API 域名
pub fn classify(request: &ProxyRequest) -> Route {
    let host = request.url.host_str().unwrap_or_default();
    if request.url.path().contains(COMPLETION_PATH)
        || host.contains("openai.com")
        || host.contains("api.")
    {
        Route::Bypass
    } else {
        Route::Cache
    }
}

pub struct CacheProxy {
    generation: String,
    origin: Url,
    manifest: Vec<String>,
    entry_point: String,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    revalidations: TaskTracker,
    controlling: AtomicBool,
}

impl CacheProxy {
    pub fn new(
        generation: impl Into<String>,
        origin: &str,
        manifest: Vec<String>,
        entry_point: impl Into<String>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ProxyError> {
        let origin =
            Url::parse(origin).map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", origin, e)))?;
        Ok(Self {
            generation: generation.into(),
            origin,
            manifest,
            entry_point: entry_point.into(),
            storage,
            fetcher,
            revalidations: TaskTracker::new(),
            controlling: AtomicBool::new(false),
        })
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// activate 之后才接管请求
    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::SeqCst)
    }

    /// 资源路径转为完整 URL
    pub fn resolve(&self, path: &str) -> Result<String, ProxyError> {
        self.origin
            .join(path)
            .map(|u| u.to_string())
            .map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// 安装：预取清单中的全部静态资源写入当前缓存代，随后立即激活
    ///
    /// 任一资源失败则整体失败，不写入任何条目。
    pub async fn install(&self) -> Result<(), ProxyError> {
        info!("安装缓存代理 {}", self.generation);
        self.storage.open(&self.generation).await?;
        let mut fetched = Vec::with_capacity(self.manifest.len());
        for path in &self.manifest {
            let request = ProxyRequest::get(&self.resolve(path)?)?;
            let response = self.fetcher.fetch(&request).await?;
            if !response.is_success() {
                return Err(ProxyError::Network(format!(
                    "{} 返回 {}",
                    request.url, response.status
                )));
            }
            fetched.push((request.key(), response));
        }
        for (key, response) in &fetched {
            self.storage.put(&self.generation, key, response).await?;
        }
        info!("缓存静态资源 {} 个", fetched.len());
        self.activate().await
    }

    /// 激活：删除其它缓存代并接管请求
    pub async fn activate(&self) -> Result<(), ProxyError> {
        for name in self.storage.keys().await? {
            if name != self.generation {
                info!("删除旧缓存 {}", name);
                self.storage.delete(&name).await?;
            }
        }
        self.controlling.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// 处理一次请求
    pub async fn handle(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        if !self.is_controlling() {
            debug!("尚未激活，直接请求 {}", request.url);
            return self.fetcher.fetch(&request).await;
        }
        if classify(&request) == Route::Bypass {
            debug!("不缓存的请求 {}", request.url);
            return self.fetcher.fetch(&request).await;
        }

        let key = request.key();
        let cached = match self.storage.match_entry(&self.generation, &key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!("读取缓存失败 {}: {}", key, e);
                None
            }
        };
        if let Some(cached) = cached {
            self.revalidate(request, key);
            return Ok(cached);
        }

        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if response.is_success() && request.is_get() {
                    if let Err(e) = self.storage.put(&self.generation, &key, &response).await {
                        warn!("写入缓存失败 {}: {}", key, e);
                    }
                }
                Ok(response)
            }
            Err(e) => {
                warn!("网络不可用 {}: {}", request.url, e);
                if request.mode == RequestMode::Navigate {
                    if let Some(entry) = self.entry_document().await {
                        return Ok(entry);
                    }
                }
                Ok(ProxyResponse::unavailable())
            }
        }
    }

    /// 后台重新请求并覆盖缓存，失败时保留原缓存
    fn revalidate(&self, request: ProxyRequest, key: String) {
        let fetcher = self.fetcher.clone();
        let storage = self.storage.clone();
        let generation = self.generation.clone();
        self.revalidations.spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    if let Err(e) = storage.put(&generation, &key, &response).await {
                        warn!("后台更新缓存失败 {}: {}", key, e);
                    } else {
                        debug!("后台更新缓存 {}", key);
                    }
                }
                Ok(response) => debug!("后台更新跳过 {} 状态 {}", key, response.status),
                Err(e) => debug!("后台更新失败 {}: {}", key, e),
            }
        });
    }

    async fn entry_document(&self) -> Option<ProxyResponse> {
        let url = self.resolve(&self.entry_point).ok()?;
        let key = ProxyRequest::get(&url).ok()?.key();
        self.storage
            .match_entry(&self.generation, &key)
            .await
            .ok()
            .flatten()
    }

    /// 等待所有后台刷新完成
    pub async fn settle(&self) {
        self.revalidations.close();
        self.revalidations.wait().await;
        self.revalidations.reopen();
    }
}
