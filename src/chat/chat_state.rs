use std::sync::Arc;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::model::param::{ModelMessage, now_millis};
use crate::prompt::{self, PromptUse};
use crate::store::{ChatRecord, Persistence, StudioRecord};

/// 生成任务所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 请求已发出，尚未收到响应
    Sending,
    /// 非流式，等待完整响应
    Waiting,
    /// 正在接收流式增量
    Streaming,
}

/// 进行中的生成任务，全局至多一个
#[derive(Debug, Clone)]
pub struct GenerationSession {
    pub chat_id: String,
    /// 占位消息在对话中的位置
    pub message_index: usize,
    pub phase: Phase,
    cancel_token: CancellationToken,
}

impl GenerationSession {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Chat 状态管理模块
/// 负责持久化记录、当前对话、系统提示以及唯一的生成任务
pub struct ChatState {
    pub record: StudioRecord,
    /// 全局系统提示，优先于对话自身的系统提示
    pub system_prompt: String,
    session: Option<GenerationSession>,
    /// 只在本进程内生效的 API Key，不写入持久化记录
    api_key_override: Option<String>,
    store: Arc<dyn Persistence>,
}

impl ChatState {
    pub fn new(record: StudioRecord, store: Arc<dyn Persistence>) -> Self {
        let system_prompt = record
            .current_chat()
            .map(|c| c.system_prompt.clone())
            .unwrap_or_default();
        Self {
            record,
            system_prompt,
            session: None,
            api_key_override: None,
            store,
        }
    }

    /// 从存储载入
    pub async fn load(store: Arc<dyn Persistence>) -> Result<Self, ChatError> {
        let record = store.load().await?;
        Ok(Self::new(record, store))
    }

    /// 使用配置文件中的 API Key，不保存
    pub fn override_api_key(&mut self, key: impl Into<String>) {
        self.api_key_override = Some(key.into());
    }

    /// 当前生效的 API Key
    pub fn api_key(&self) -> &str {
        self.api_key_override
            .as_deref()
            .unwrap_or(self.record.api_key.as_str())
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&GenerationSession> {
        self.session.as_ref()
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if let Some(session) = self.session.as_mut() {
            session.phase = phase;
        }
    }

    pub(crate) fn take_session(&mut self) -> Option<GenerationSession> {
        self.session.take()
    }

    /// 取消进行中的生成，没有任务时返回 false
    pub fn cancel(&self) -> bool {
        match &self.session {
            Some(session) => {
                info!("停止生成，当前阶段 {:?}", session.phase);
                session.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    /// 开始一次生成：追加用户消息和空的助手占位消息
    ///
    /// 已有任务或未设置 API Key 时直接拒绝，状态保持不变。
    pub fn begin(&mut self, text: &str) -> Result<CancellationToken, ChatError> {
        if self.session.is_some() {
            warn!("已有生成任务在进行中，拒绝新的请求");
            return Err(ChatError::AlreadyActive);
        }
        if self.api_key().trim().is_empty() {
            return Err(ChatError::MissingCredential);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let chat_id = self.ensure_chat();
        let chat = self.chat_mut(&chat_id)?;
        chat.messages.push(ModelMessage::user(text));
        let message_index = chat.messages.len();
        chat.messages.push(ModelMessage::assistant(""));
        chat.updated_at = now_millis();

        let cancel_token = CancellationToken::new();
        self.session = Some(GenerationSession {
            chat_id,
            message_index,
            phase: Phase::Sending,
            cancel_token: cancel_token.clone(),
        });
        info!("开始生成，占位消息位置 {}", message_index);
        Ok(cancel_token)
    }

    /// 保证存在当前对话，返回其 id
    pub fn ensure_chat(&mut self) -> String {
        match self.record.current_chat_id.clone() {
            Some(id) if self.record.chats.contains_key(&id) => id,
            _ => self.create_chat(),
        }
    }

    /// 新建对话并设为当前对话
    pub fn create_chat(&mut self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        info!("新建对话 {}", id);
        self.record.chats.insert(id.clone(), ChatRecord::new(id.clone()));
        self.record.current_chat_id = Some(id.clone());
        self.system_prompt.clear();
        id
    }

    /// 切换当前对话，同时载入其系统提示
    pub fn select_chat(&mut self, id: &str) -> Result<(), ChatError> {
        let chat = self.chat(id)?;
        self.system_prompt = chat.system_prompt.clone();
        self.record.current_chat_id = Some(id.to_string());
        Ok(())
    }

    /// 删除对话；正在生成的对话不能删除
    pub fn delete_chat(&mut self, id: &str) -> Result<bool, ChatError> {
        if self.session.as_ref().is_some_and(|s| s.chat_id == id) {
            return Err(ChatError::AlreadyActive);
        }
        let removed = self.record.chats.remove(id).is_some();
        if self.record.current_chat_id.as_deref() == Some(id) {
            self.record.current_chat_id = None;
            self.system_prompt.clear();
        }
        Ok(removed)
    }

    pub fn chat(&self, id: &str) -> Result<&ChatRecord, ChatError> {
        self.record
            .chats
            .get(id)
            .ok_or_else(|| ChatError::NoActiveChat(id.to_string()))
    }

    pub fn chat_mut(&mut self, id: &str) -> Result<&mut ChatRecord, ChatError> {
        self.record
            .chats
            .get_mut(id)
            .ok_or_else(|| ChatError::NoActiveChat(id.to_string()))
    }

    pub fn current_chat(&self) -> Option<&ChatRecord> {
        self.record.current_chat()
    }

    /// 设置系统提示，同时写入当前对话
    pub fn set_system_prompt(&mut self, text: &str) {
        self.system_prompt = text.trim().to_string();
        if let Some(id) = self.record.current_chat_id.clone() {
            if let Some(chat) = self.record.chats.get_mut(&id) {
                chat.system_prompt = self.system_prompt.clone();
            }
        }
    }

    pub fn clear_system_prompt(&mut self) {
        self.set_system_prompt("");
    }

    /// 按名称使用常用 Prompt；系统类 Prompt 直接生效
    pub fn use_prompt(&mut self, name: &str) -> Option<PromptUse> {
        let usage = prompt::find_by_name(&self.record.saved_prompts, name)?.apply();
        if let PromptUse::System(content) = &usage {
            let content = content.clone();
            self.set_system_prompt(&content);
        }
        Some(usage)
    }

    /// 根据第一条用户消息生成标题
    pub fn derive_title(&mut self, chat_id: &str) -> bool {
        self.record
            .chats
            .get_mut(chat_id)
            .is_some_and(|chat| chat.derive_title())
    }

    /// 保存到存储，失败只记录日志
    pub async fn persist(&self) {
        if let Err(e) = self.store.save(&self.record).await {
            warn!("保存本地数据失败: {}", e);
        }
    }

    /// 对话中的用户消息数量
    pub fn user_turns(&self, chat_id: &str) -> usize {
        self.chat(chat_id)
            .map(|c| c.user_message_count())
            .unwrap_or_default()
    }
}
