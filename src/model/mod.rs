//! # model
//! model 模块负责构建请求参数并与补全接口通信

use crate::connection::CompletionResponse;
use crate::error::ChatError;

pub mod openai;
pub mod param;
pub mod request;

pub use request::{CompletionRequest, build_request, resolve_system_prompt};

pub trait AgentModel {
    /// 发送补全请求；非 2xx 响应在这里就转换为错误
    async fn send(&self, request: &CompletionRequest<'_>) -> Result<CompletionResponse, ChatError>;
}
