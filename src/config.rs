use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::model::param::{GenerationParams, ReasoningEffort, Verbosity};
use crate::store::{DEFAULT_API_BASE, StudioRecord};

fn api_base_default() -> String {
    DEFAULT_API_BASE.into()
}
fn generation_default() -> String {
    format!("chat-studio-v{}", env!("CARGO_PKG_VERSION"))
}
fn origin_default() -> String {
    "http://localhost:8080/".into()
}
fn manifest_default() -> Vec<String> {
    ["/", "/index.html", "/styles.css", "/app.js", "/manifest.json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn entry_point_default() -> String {
    "/index.html".into()
}

/// 静态资源缓存配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// 缓存代名称，修改后旧缓存在激活时整体删除
    #[serde(default = "generation_default")]
    pub generation: String,
    #[serde(default = "origin_default")]
    pub origin: String,
    #[serde(default = "manifest_default")]
    pub manifest: Vec<String>,
    #[serde(default = "entry_point_default")]
    pub entry_point: String,
    /// 磁盘缓存目录，不设置时使用系统缓存目录
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: generation_default(),
            origin: origin_default(),
            manifest: manifest_default(),
            entry_point: entry_point_default(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// 覆盖已保存的 API Key，只在运行时生效
    pub api_key: Option<String>,
    #[serde(default = "api_base_default")]
    pub api_base: String,
    pub model: Option<String>,
    pub stream: Option<bool>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub verbosity: Option<Verbosity>,
    pub tone: Option<String>,
    pub system_prompt: Option<String>,
    /// 本地数据文件位置
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: api_base_default(),
            model: None,
            stream: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
            reasoning_effort: None,
            verbosity: None,
            tone: None,
            system_prompt: None,
            store_path: None,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// 读取配置文件，不存在时使用默认配置
    pub fn from_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("{} 格式错误: {}", path.display(), e))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// 将配置中出现的字段覆盖到持久化记录上，api_key 除外
    pub fn apply(&self, record: &mut StudioRecord) {
        if self.api_base != DEFAULT_API_BASE || record.api_base.is_empty() {
            record.api_base = self.api_base.clone();
        }
        let params: &mut GenerationParams = &mut record.params;
        if let Some(model) = &self.model {
            params.model = model.clone();
        }
        if let Some(stream) = self.stream {
            params.stream = stream;
        }
        if let Some(v) = self.temperature {
            params.temperature = v;
        }
        if let Some(v) = self.top_p {
            params.top_p = v;
        }
        if let Some(v) = self.max_tokens {
            params.max_tokens = v;
        }
        if let Some(v) = self.presence_penalty {
            params.presence_penalty = v;
        }
        if let Some(v) = self.frequency_penalty {
            params.frequency_penalty = v;
        }
        if let Some(v) = self.reasoning_effort {
            params.reasoning_effort = v;
        }
        if let Some(v) = self.verbosity {
            params.verbosity = v;
        }
        if let Some(v) = &self.tone {
            params.tone = v.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"api_key":"sk-1","model":"gpt-4o","cache":{"origin":"https://chat.example.com/"}}"#,
        )
        .unwrap();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.cache.origin, "https://chat.example.com/");
        assert_eq!(config.cache.entry_point, "/index.html");
        assert_eq!(config.cache.manifest.len(), 5);
        assert!(config.cache.generation.starts_with("chat-studio-v"));
    }

    #[test]
    fn apply_only_overrides_present_fields() {
        let config: Config =
            serde_json::from_str(r#"{"api_key":"sk-new","max_tokens":512,"stream":false}"#)
                .unwrap();
        let mut record = StudioRecord::default();
        record.params.temperature = 0.3;
        config.apply(&mut record);
        assert_eq!(record.api_key, "");
        assert_eq!(record.params.max_tokens, 512);
        assert!(!record.params.stream);
        assert_eq!(record.params.temperature, 0.3);
        assert_eq!(record.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn missing_file_is_default() {
        let config = Config::from_path("/nonexistent/chat-studio/config.json").unwrap();
        assert!(config.api_key.is_none());
    }
}
