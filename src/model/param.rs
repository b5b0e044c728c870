use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 对话中的一条消息，流式生成时 content 只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
    /// 毫秒时间戳
    #[serde(default)]
    pub timestamp: i64,
}

impl ModelMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    /// 追加流式增量
    pub fn add_content(&mut self, delta: &str) {
        self.content.push_str(delta);
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 推理深度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    None,
    Low,
    #[default]
    Medium,
    High,
}

/// 输出详细程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    #[default]
    Medium,
    High,
}

pub const DEFAULT_TONE: &str = "default";

fn default_model() -> String {
    "gpt-5.1".into()
}
fn default_stream() -> bool {
    true
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    1.0
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_tone() -> String {
    DEFAULT_TONE.into()
}

/// 生成参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    #[serde(default = "default_model", rename = "currentModel")]
    pub model: String,
    #[serde(default = "default_stream", rename = "streamEnabled")]
    pub stream: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    #[serde(default)]
    pub verbosity: Verbosity,
    #[serde(default = "default_tone")]
    pub tone: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: default_model(),
            stream: default_stream(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            reasoning_effort: ReasoningEffort::default(),
            verbosity: Verbosity::default(),
            tone: default_tone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_fill_defaults_from_partial_json() {
        let params: GenerationParams =
            serde_json::from_str(r#"{"currentModel":"gpt-4o","temperature":0.2}"#).unwrap();
        assert_eq!(params.model, "gpt-4o");
        assert_eq!(params.temperature, 0.2);
        assert!(params.stream);
        assert_eq!(params.max_tokens, 4096);
        assert_eq!(params.tone, DEFAULT_TONE);
        assert_eq!(params.reasoning_effort, ReasoningEffort::Medium);
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = ModelMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
