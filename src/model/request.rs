use serde::Serialize;

use super::param::{
    DEFAULT_TONE, GenerationParams, ModelMessage, ReasoningEffort, Role, Verbosity,
};

/// 推理系列模型前缀，使用 max_completion_tokens 并支持推理参数
pub const REASONING_PREFIX: &str = "gpt-5";
/// 受限参数系列模型前缀，只接受 max_completion_tokens
pub const LIMITED_PREFIX: &str = "o1";

/// 模型系列，按名称前缀匹配，先匹配先生效
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Reasoning,
    LimitedParams,
    Standard,
}

impl ModelFamily {
    pub fn of(model: &str) -> Self {
        if model.starts_with(REASONING_PREFIX) {
            ModelFamily::Reasoning
        } else if model.starts_with(LIMITED_PREFIX) {
            ModelFamily::LimitedParams
        } else {
            ModelFamily::Standard
        }
    }
}

/// 请求体中的消息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

/// chat/completions 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<RequestMessage<'a>>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<&'a str>,
}

/// 系统提示：全局优先，其次是对话自身的
pub fn resolve_system_prompt<'a>(global: &'a str, chat: &'a str) -> Option<&'a str> {
    if !global.is_empty() {
        Some(global)
    } else if !chat.is_empty() {
        Some(chat)
    } else {
        None
    }
}

/// 根据参数和历史消息构建请求，不修改输入
pub fn build_request<'a>(
    params: &'a GenerationParams,
    history: &'a [ModelMessage],
    system_prompt: Option<&'a str>,
) -> CompletionRequest<'a> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(system) = system_prompt {
        messages.push(RequestMessage {
            role: Role::System,
            content: system,
        });
    }
    messages.extend(history.iter().map(|m| RequestMessage {
        role: m.role,
        content: &m.content,
    }));

    let mut request = CompletionRequest {
        model: &params.model,
        messages,
        stream: params.stream,
        temperature: None,
        top_p: None,
        max_tokens: None,
        max_completion_tokens: None,
        presence_penalty: None,
        frequency_penalty: None,
        reasoning_effort: None,
        verbosity: None,
        tone: None,
    };

    match ModelFamily::of(&params.model) {
        ModelFamily::Reasoning => {
            request.temperature = Some(params.temperature);
            request.top_p = Some(params.top_p);
            request.max_completion_tokens = Some(params.max_tokens);
            request.presence_penalty = Some(params.presence_penalty);
            request.frequency_penalty = Some(params.frequency_penalty);
            request.reasoning_effort = Some(params.reasoning_effort);
            request.verbosity = Some(params.verbosity);
            if params.tone != DEFAULT_TONE {
                request.tone = Some(&params.tone);
            }
        }
        ModelFamily::LimitedParams => {
            request.max_completion_tokens = Some(params.max_tokens);
        }
        ModelFamily::Standard => {
            request.temperature = Some(params.temperature);
            request.top_p = Some(params.top_p);
            request.max_tokens = Some(params.max_tokens);
            request.presence_penalty = Some(params.presence_penalty);
            request.frequency_penalty = Some(params.frequency_penalty);
        }
    }
    request
}
