//! 错误类型

use thiserror::Error;

/// 对话生成过程中可能出现的错误
#[derive(Debug, Error)]
pub enum ChatError {
    /// 未配置 API Key，请求前即拒绝
    #[error("请先设置 API Key")]
    MissingCredential,

    /// 已有生成任务在进行中
    #[error("已有生成任务在进行中")]
    AlreadyActive,

    /// 没有进行中的生成任务
    #[error("没有进行中的生成任务")]
    Idle,

    /// 输入为空
    #[error("消息内容为空")]
    EmptyMessage,

    /// 当前没有可用的对话
    #[error("对话不存在: {0}")]
    NoActiveChat(String),

    /// 网络层失败（连接、发送、读取）
    #[error("网络错误: {0}")]
    Http(#[from] reqwest::Error),

    /// 非 2xx 响应，message 为提取后的用户可读文本
    #[error("{message}")]
    Status { status: u16, message: String },

    /// 成功响应但内容无法解析
    #[error("响应格式错误: {0}")]
    MalformedBody(String),

    /// 流式读取中途失败
    #[error("流式响应错误: {0}")]
    Stream(String),

    /// 持久化失败
    #[error("保存失败: {0}")]
    Persistence(#[from] StoreError),

    /// 常用 Prompt 校验失败
    #[error("{0}")]
    InvalidPrompt(String),
}

impl ChatError {
    /// 是否属于传输类错误（需要回滚占位消息）
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChatError::Http(_)
                | ChatError::Status { .. }
                | ChatError::MalformedBody(_)
                | ChatError::Stream(_)
        )
    }

    /// 展示给用户的文本
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// 持久化层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// 缓存代理错误
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("网络请求失败: {0}")]
    Network(String),

    #[error("缓存存储错误: {0}")]
    Storage(String),

    #[error("无效的 URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        ProxyError::Network(e.to_string())
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        ProxyError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(e: serde_json::Error) -> Self {
        ProxyError::Storage(e.to_string())
    }
}
