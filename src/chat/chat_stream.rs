use futures::{StreamExt, pin_mut};
use log::{debug, info};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::render::{FrameThrottle, Render};
use crate::connection::{ByteStream, CompletionResponse, DirectConnection, SseConnection};
use crate::error::ChatError;
use crate::model::param::ModelMessage;

/// 生成结束的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Cancelled,
}

/// 将补全响应写入占位消息
pub struct ChatStream;

impl ChatStream {
    /// 消费响应，增量写入 message
    ///
    /// 取消时保留已写入的内容并返回 `Cancelled`；传输或解析失败返回 Err，
    /// 由调用方决定如何回滚。
    pub async fn consume<R: Render + ?Sized>(
        response: CompletionResponse,
        message: &mut ModelMessage,
        cancel_token: &CancellationToken,
        render: &mut R,
    ) -> Result<StopReason, ChatError> {
        match response {
            CompletionResponse::Document(body) => {
                let text = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        info!("等待响应时取消");
                        return Ok(StopReason::Cancelled);
                    }
                    text = body => text?,
                };
                message.content = DirectConnection::parse_document(&text)?;
                Ok(StopReason::Completed)
            }
            CompletionResponse::Stream(body) => {
                Self::consume_stream(body, message, cancel_token, render).await
            }
        }
    }

    async fn consume_stream<R: Render + ?Sized>(
        body: ByteStream,
        message: &mut ModelMessage,
        cancel_token: &CancellationToken,
        render: &mut R,
    ) -> Result<StopReason, ChatError> {
        let deltas = SseConnection::deltas(body);
        pin_mut!(deltas);
        let mut throttle = FrameThrottle::default();
        let mut count = 0usize;
        let reason = loop {
            // 有未渲染的增量时，到下一帧补一次渲染
            let frame = throttle.deadline();
            let next = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("流式取消，已接收 {} 个增量", count);
                    break StopReason::Cancelled;
                }
                _ = sleep_until(frame.unwrap_or_else(Instant::now)), if frame.is_some() => {
                    throttle.flush(render, &message.content);
                    continue;
                }
                next = deltas.next() => next,
            };
            match next {
                Some(Ok(delta)) => {
                    count += 1;
                    message.add_content(&delta);
                    throttle.touch(render, &message.content);
                }
                Some(Err(e)) => return Err(e),
                None => break StopReason::Completed,
            }
        };
        throttle.flush(render, &message.content);
        debug!("流式处理结束 {:?}，共 {} 个增量", reason, count);
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::render::tests::RecordingRender;
    use bytes::Bytes;
    use futures::{FutureExt, stream};

    fn delta_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices":[{"delta":{"content":text}}]})
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stream_increments_are_appended_in_order() {
        let body: String = ["He", "l", "lo"].iter().map(|d| delta_line(d)).collect::<String>()
            + "data: [DONE]\n\n";
        let chunks: Vec<Result<Bytes, ChatError>> = body
            .into_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let mut msg = ModelMessage::assistant("");
        let mut render = RecordingRender::default();
        let reason = ChatStream::consume(
            CompletionResponse::Stream(stream::iter(chunks).boxed()),
            &mut msg,
            &CancellationToken::new(),
            &mut render,
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::Completed);
        assert_eq!(msg.content, "Hello");
        // 时间暂停，所有增量落在同一帧：首帧一次 + 结束 flush 一次
        assert_eq!(render.partials.len(), 2);
        assert_eq!(render.partials.last().unwrap(), "Hello");
    }

    /// 记录每次渲染相对开始时刻的毫秒数
    struct TimedRender {
        start: Instant,
        partials: Vec<(u128, String)>,
    }

    impl Render for TimedRender {
        fn render_partial(&mut self, content: &str) {
            self.partials
                .push((self.start.elapsed().as_millis(), content.to_string()));
        }

        fn render_final(&mut self, _content: &str) {}
    }

    #[tokio::test(start_paused = true)]
    async fn pending_increment_is_rendered_by_next_frame() {
        use std::time::Duration;

        let body: ByteStream = async_stream::stream! {
            yield Ok(Bytes::from(delta_line("a")));
            tokio::time::sleep(Duration::from_millis(1)).await;
            yield Ok(Bytes::from(delta_line("b")));
            tokio::time::sleep(Duration::from_millis(1000)).await;
            yield Ok(Bytes::from(delta_line("c")));
        }
        .boxed();
        let mut msg = ModelMessage::assistant("");
        let mut render = TimedRender {
            start: Instant::now(),
            partials: Vec::new(),
        };
        let reason = ChatStream::consume(
            CompletionResponse::Stream(body),
            &mut msg,
            &CancellationToken::new(),
            &mut render,
        )
        .await
        .unwrap();

        assert_eq!(reason, StopReason::Completed);
        assert_eq!(msg.content, "abc");
        assert_eq!(
            render.partials,
            vec![
                (0, "a".to_string()),
                (16, "ab".to_string()),
                (1001, "abc".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_before_reading_keeps_existing_content() {
        let token = CancellationToken::new();
        token.cancel();
        let mut msg = ModelMessage::assistant("partial");
        let mut render = RecordingRender::default();
        let body = stream::pending::<Result<Bytes, ChatError>>().boxed();
        let reason = ChatStream::consume(
            CompletionResponse::Stream(body),
            &mut msg,
            &token,
            &mut render,
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::Cancelled);
        assert_eq!(msg.content, "partial");
    }

    #[tokio::test]
    async fn document_mode_sets_content_once() {
        let mut msg = ModelMessage::assistant("");
        let mut render = RecordingRender::default();
        let doc = r#"{"choices":[{"message":{"role":"assistant","content":"Hi"}}]}"#;
        let reason = ChatStream::consume(
            CompletionResponse::document(doc),
            &mut msg,
            &CancellationToken::new(),
            &mut render,
        )
        .await
        .unwrap();
        assert_eq!(reason, StopReason::Completed);
        assert_eq!(msg.content, "Hi");
        assert!(render.partials.is_empty());
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_document() {
        let token = CancellationToken::new();
        let mut msg = ModelMessage::assistant("");
        let body = futures::future::pending::<Result<String, ChatError>>().boxed();
        let mut render = RecordingRender::default();
        let cancel = token.clone();
        let (reason, _) = tokio::join!(
            ChatStream::consume(
                CompletionResponse::Document(body),
                &mut msg,
                &token,
                &mut render,
            ),
            async move { cancel.cancel() }
        );
        assert_eq!(reason.unwrap(), StopReason::Cancelled);
        assert_eq!(msg.content, "");
    }
}
