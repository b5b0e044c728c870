//! 持久化状态：凭证、接口地址、生成参数、对话和常用 Prompt

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::param::{GenerationParams, ModelMessage, Role, now_millis};
use crate::prompt::SavedPrompt;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_TITLE: &str = "新对话";
const TITLE_MAX_CHARS: usize = 30;

fn default_api_base() -> String {
    DEFAULT_API_BASE.into()
}

/// 单个对话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub system_prompt: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChatRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            title: DEFAULT_CHAT_TITLE.into(),
            messages: Vec::new(),
            system_prompt: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// 用第一条用户消息的前 30 个字符作为标题
    pub fn derive_title(&mut self) -> bool {
        let Some(first) = self.messages.iter().find(|m| m.role == Role::User) else {
            return false;
        };
        let mut title: String = first.content.chars().take(TITLE_MAX_CHARS).collect();
        if first.content.chars().count() > TITLE_MAX_CHARS {
            title.push_str("...");
        }
        self.title = title;
        true
    }
}

/// 整个应用的持久化记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioRecord {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(flatten)]
    pub params: GenerationParams,
    #[serde(default)]
    pub chats: HashMap<String, ChatRecord>,
    #[serde(default)]
    pub saved_prompts: Vec<SavedPrompt>,
    #[serde(default)]
    pub current_chat_id: Option<String>,
}

impl Default for StudioRecord {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            params: GenerationParams::default(),
            chats: HashMap::new(),
            saved_prompts: Vec::new(),
            current_chat_id: None,
        }
    }
}

impl StudioRecord {
    /// 按最近更新时间倒序
    pub fn chats_by_recency(&self) -> Vec<&ChatRecord> {
        let mut chats: Vec<&ChatRecord> = self.chats.values().collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        chats
    }

    pub fn current_chat(&self) -> Option<&ChatRecord> {
        self.current_chat_id
            .as_deref()
            .and_then(|id| self.chats.get(id))
    }
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load(&self) -> Result<StudioRecord, StoreError>;
    async fn save(&self, record: &StudioRecord) -> Result<(), StoreError>;
}

/// 以 JSON 文件保存
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认保存位置 <data_local_dir>/chat-studio/state.json
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|dir| dir.join("chat-studio").join("state.json"))
            .unwrap_or_else(|| PathBuf::from("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn load(&self) -> Result<StudioRecord, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let record = serde_json::from_str(&text)?;
                info!("载入本地数据 {}", self.path.display());
                Ok(record)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("本地数据不存在，使用默认值");
                Ok(StudioRecord::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, record: &StudioRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("保存本地数据 {}", self.path.display());
        Ok(())
    }
}

/// 内存存储，测试和临时会话使用
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<StudioRecord>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<StudioRecord> {
        self.record.lock().ok().and_then(|r| r.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or_default()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn load(&self) -> Result<StudioRecord, StoreError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    async fn save(&self, record: &StudioRecord) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.record.lock() {
            *slot = Some(record.clone());
        }
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }
}
