use async_stream::stream;
use futures::{Stream, StreamExt};
use log::{debug, info};
use serde::Deserialize;

use super::ByteStream;
use super::decoder::Utf8Decoder;
use super::sse::{LineBuffer, SseLine, parse_line};
use crate::error::ChatError;

pub struct SseConnection;

impl SseConnection {
    /// 将响应体字节流解析为文本增量流
    ///
    /// 遇到 `[DONE]` 或者字节流结束时结束，无法解析的数据行直接丢弃。
    /// 字节流出错时产出一次 Err 并结束。
    pub fn deltas(mut body: ByteStream) -> impl Stream<Item = Result<String, ChatError>> {
        stream! {
            let mut decoder = Utf8Decoder::new();
            let mut lines = LineBuffer::new();
            info!("开始流式处理");
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let text = decoder.push(&chunk);
                for line in lines.push(&text) {
                    match parse_line(&line) {
                        SseLine::Delta(delta) => yield Ok(delta),
                        SseLine::Done => {
                            info!("流式结束");
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }
            // 连接关闭时没有换行结尾的最后一行
            let tail = decoder.finish();
            let mut rest = lines.push(&tail);
            rest.extend(lines.take_rest());
            for line in rest {
                if let SseLine::Delta(delta) = parse_line(&line) {
                    yield Ok(delta);
                }
            }
            debug!("字节流结束");
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionDocument {
    choices: Vec<DocumentChoice>,
}

#[derive(Debug, Deserialize)]
struct DocumentChoice {
    #[serde(default)]
    message: Option<DocumentMessage>,
}

#[derive(Debug, Deserialize)]
struct DocumentMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct DirectConnection;

impl DirectConnection {
    /// 解析非流式响应，取第一个 choice 的内容
    pub fn parse_document(text: &str) -> Result<String, ChatError> {
        let doc: CompletionDocument =
            serde_json::from_str(text).map_err(|e| ChatError::MalformedBody(e.to_string()))?;
        Ok(doc
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorDocument {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// 从失败响应中提取用户可读的错误信息
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorDocument>(body)
        .ok()
        .and_then(|doc| doc.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn body(chunks: Vec<&[u8]>) -> ByteStream {
        let items: Vec<Result<Bytes, ChatError>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(items).boxed()
    }

    async fn collect(body: ByteStream) -> Vec<Result<String, ChatError>> {
        SseConnection::deltas(body).collect().await
    }

    const SCRIPT: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n\n",
        ": ping\n",
        "data: {broken\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\", wörld\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n\n",
    );

    #[tokio::test]
    async fn assembled_text_is_independent_of_chunk_boundaries() {
        let bytes = SCRIPT.as_bytes();
        for size in 1..=bytes.len() {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let text: String = collect(body(chunks))
                .await
                .into_iter()
                .map(|r| r.unwrap())
                .collect();
            assert_eq!(text, "你好, wörld", "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn scenario_hello() {
        let out = collect(body(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n",
            b"data: [DONE]\n",
        ]))
        .await;
        let deltas: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(deltas, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn last_line_without_newline_is_used() {
        let out = collect(body(vec![b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}"])).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "x");
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let items: Vec<Result<Bytes, ChatError>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n")),
            Err(ChatError::Stream("connection reset".into())),
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n")),
        ];
        let out = collect(stream::iter(items).boxed()).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "a");
        assert!(matches!(out[1], Err(ChatError::Stream(_))));
    }

    #[test]
    fn document_content_is_extracted() {
        let text = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Hi there"}}]}"#;
        assert_eq!(DirectConnection::parse_document(text).unwrap(), "Hi there");
        assert_eq!(
            DirectConnection::parse_document(r#"{"choices":[]}"#).unwrap(),
            ""
        );
        assert!(matches!(
            DirectConnection::parse_document("<html>"),
            Err(ChatError::MalformedBody(_))
        ));
    }

    #[test]
    fn error_body_message_or_status() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        assert_eq!(error_message(429, body), "Rate limit reached");
        assert_eq!(error_message(500, "Internal Server Error"), "HTTP 500");
        assert_eq!(error_message(502, r#"{"error":{}}"#), "HTTP 502");
    }
}
