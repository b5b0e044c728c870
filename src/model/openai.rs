use futures_util::{FutureExt, StreamExt, TryFutureExt, TryStreamExt};
use log::{debug, error, info};
use reqwest::{Client, header};

use super::AgentModel;
use super::request::CompletionRequest;
use crate::connection::{CompletionResponse, error_message};
use crate::error::ChatError;

pub const COMPLETION_PATH: &str = "/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenAiModel {
    client: Client,
    pub api_key: String,
    pub url: String,
}

impl OpenAiModel {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            url: url.into(),
        }
    }

    fn get_api_key(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), COMPLETION_PATH)
    }
}

impl AgentModel for OpenAiModel {
    async fn send(&self, request: &CompletionRequest<'_>) -> Result<CompletionResponse, ChatError> {
        let url = self.endpoint();
        info!(
            "请求 {} model={} stream={} 消息数={}",
            url,
            request.model,
            request.stream,
            request.messages.len()
        );
        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, self.get_api_key())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("请求失败 {} {}", status, body);
            return Err(ChatError::Status {
                status: status.as_u16(),
                message: error_message(status.as_u16(), &body),
            });
        }

        if request.stream {
            let body = response
                .bytes_stream()
                .map_err(|e| ChatError::Stream(e.to_string()))
                .boxed();
            Ok(CompletionResponse::Stream(body))
        } else {
            debug!("等待非流式响应");
            let body = response.text().map_err(ChatError::from).boxed();
            Ok(CompletionResponse::Document(body))
        }
    }
}
