//! 与补全接口之间的传输层：字节流解码、SSE 分帧以及响应体解析

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::ChatError;

pub mod common;
pub mod decoder;
pub mod sse;

pub use common::{DirectConnection, SseConnection, error_message};

/// 响应体字节流
pub type ByteStream = BoxStream<'static, Result<Bytes, ChatError>>;

/// 尚未读取的完整响应体
pub type DocumentBody = BoxFuture<'static, Result<String, ChatError>>;

/// 补全接口的成功响应
pub enum CompletionResponse {
    /// 非流式：读取完成后是完整 JSON 文本
    Document(DocumentBody),
    /// 流式：text/event-stream 字节流
    Stream(ByteStream),
}

impl std::fmt::Debug for CompletionResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionResponse::Document(_) => f.write_str("Document(..)"),
            CompletionResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[cfg(test)]
impl CompletionResponse {
    /// 已经读取完成的非流式响应
    pub fn document(text: impl Into<String>) -> Self {
        use futures::FutureExt;
        CompletionResponse::Document(futures::future::ready(Ok(text.into())).boxed())
    }
}
