use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::ProxyResponse;
use crate::error::ProxyError;

/// 按缓存代（generation）划分的响应存储，没有过期时间
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// 打开（必要时创建）一个缓存代
    async fn open(&self, generation: &str) -> Result<(), ProxyError>;
    /// 所有缓存代名称
    async fn keys(&self) -> Result<Vec<String>, ProxyError>;
    /// 删除整个缓存代
    async fn delete(&self, generation: &str) -> Result<bool, ProxyError>;
    async fn match_entry(
        &self,
        generation: &str,
        key: &str,
    ) -> Result<Option<ProxyResponse>, ProxyError>;
    async fn put(
        &self,
        generation: &str,
        key: &str,
        response: &ProxyResponse,
    ) -> Result<(), ProxyError>;
}

/// 内存缓存
#[derive(Clone, Default)]
pub struct MemoryCacheStorage {
    generations: Arc<RwLock<HashMap<String, HashMap<String, ProxyResponse>>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, generation: &str) -> Result<(), ProxyError> {
        let mut generations = self.generations.write().await;
        generations.entry(generation.to_string()).or_default();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, ProxyError> {
        let generations = self.generations.read().await;
        Ok(generations.keys().cloned().collect())
    }

    async fn delete(&self, generation: &str) -> Result<bool, ProxyError> {
        let mut generations = self.generations.write().await;
        Ok(generations.remove(generation).is_some())
    }

    async fn match_entry(
        &self,
        generation: &str,
        key: &str,
    ) -> Result<Option<ProxyResponse>, ProxyError> {
        let generations = self.generations.read().await;
        Ok(generations
            .get(generation)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        generation: &str,
        key: &str,
        response: &ProxyResponse,
    ) -> Result<(), ProxyError> {
        let mut generations = self.generations.write().await;
        generations
            .entry(generation.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
}

/// 磁盘缓存：每个缓存代一个目录，每个条目 <sha256>.json + <sha256>.body
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 默认位置 <cache_dir>/chat-studio
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .map(|dir| dir.join("chat-studio"))
            .unwrap_or_else(|| PathBuf::from(".cache"))
    }

    fn entry_paths(&self, generation: &str, key: &str) -> (PathBuf, PathBuf) {
        let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
        let dir = self.root.join(generation);
        (
            dir.join(format!("{}.json", digest)),
            dir.join(format!("{}.body", digest)),
        )
    }
}

fn not_found(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::NotFound
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, generation: &str) -> Result<(), ProxyError> {
        tokio::fs::create_dir_all(self.root.join(generation)).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, ProxyError> {
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if not_found(&e) => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn delete(&self, generation: &str) -> Result<bool, ProxyError> {
        match tokio::fs::remove_dir_all(self.root.join(generation)).await {
            Ok(()) => Ok(true),
            Err(e) if not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn match_entry(
        &self,
        generation: &str,
        key: &str,
    ) -> Result<Option<ProxyResponse>, ProxyError> {
        let (meta_path, body_path) = self.entry_paths(generation, key);
        let meta = match tokio::fs::read(&meta_path).await {
            Ok(meta) => meta,
            Err(e) if not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: EntryMeta = serde_json::from_slice(&meta)?;
        if meta.key != key {
            debug!("缓存键冲突 {} != {}", meta.key, key);
            return Ok(None);
        }
        let body = match tokio::fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) if not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(ProxyResponse {
            status: meta.status,
            headers: meta.headers,
            body: Bytes::from(body),
        }))
    }

    async fn put(
        &self,
        generation: &str,
        key: &str,
        response: &ProxyResponse,
    ) -> Result<(), ProxyError> {
        self.open(generation).await?;
        let (meta_path, body_path) = self.entry_paths(generation, key);
        let meta = EntryMeta {
            key: key.to_string(),
            status: response.status,
            headers: response.headers.clone(),
        };
        // 先写内容再写元数据，读取时以元数据存在为准
        tokio::fs::write(&body_path, &response.body).await?;
        tokio::fs::write(&meta_path, serde_json::to_vec(&meta)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(storage: &dyn CacheStorage) {
        storage.open("v1").await.unwrap();
        let resp = ProxyResponse::new(200, "body-1");
        storage.put("v1", "GET https://a/x", &resp).await.unwrap();
        assert_eq!(
            storage.match_entry("v1", "GET https://a/x").await.unwrap(),
            Some(resp.clone())
        );
        assert_eq!(storage.match_entry("v1", "GET https://a/y").await.unwrap(), None);
        assert_eq!(storage.match_entry("v2", "GET https://a/x").await.unwrap(), None);

        storage.put("v2", "GET https://a/x", &resp).await.unwrap();
        let mut keys = storage.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["v1", "v2"]);

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert_eq!(storage.match_entry("v1", "GET https://a/x").await.unwrap(), None);
        assert_eq!(storage.keys().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn memory_storage_generations() {
        exercise(&MemoryCacheStorage::new()).await;
    }

    #[tokio::test]
    async fn disk_storage_generations() {
        let root = std::env::temp_dir().join(format!("chat-studio-cache-{}", uuid::Uuid::new_v4()));
        let storage = DiskCacheStorage::new(&root);
        assert!(storage.keys().await.unwrap().is_empty());
        exercise(&storage).await;

        let mut resp = ProxyResponse::new(200, vec![0u8, 159, 146, 150]);
        resp.headers.push(("content-type".into(), "application/octet-stream".into()));
        storage.put("v2", "GET https://a/bin", &resp).await.unwrap();
        assert_eq!(
            storage.match_entry("v2", "GET https://a/bin").await.unwrap(),
            Some(resp)
        );
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
