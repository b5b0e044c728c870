use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::connection::CompletionResponse;
use crate::error::ChatError;
use crate::model::param::now_millis;
use crate::model::{AgentModel, build_request, resolve_system_prompt};

pub mod chat_state;
pub mod chat_stream;
pub mod render;

pub use chat_state::{ChatState, GenerationSession, Phase};
pub use chat_stream::{ChatStream, StopReason};
pub use render::Render;

/// 一次生成的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub chat_id: String,
    pub reason: StopReason,
    pub content: String,
    /// 对话的第一轮问答已结束，调用方可据此生成标题
    pub first_exchange: bool,
}

/// 生成流程控制：Idle → Sending → Streaming|Waiting → Completed|Cancelled|Failed → Idle
pub struct Chat<M> {
    pub state: ChatState,
    model: M,
}

impl<M: AgentModel> Chat<M> {
    pub fn new(state: ChatState, model: M) -> Self {
        Self { state, model }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// 取消进行中的生成
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }

    /// 同步完成入口检查并建立任务，返回取消令牌
    pub fn start_generation(&mut self, text: &str) -> Result<CancellationToken, ChatError> {
        self.state.begin(text)
    }

    /// 执行已建立的任务直到结束
    pub async fn run_generation<R: Render + ?Sized>(
        &mut self,
        render: &mut R,
    ) -> Result<GenerationOutcome, ChatError> {
        let Some(session) = self.state.session().cloned() else {
            return Err(ChatError::Idle);
        };
        let result = self.drive(&session, render).await;
        self.finish(session, result, render).await
    }

    /// start_generation + run_generation
    pub async fn send<R: Render + ?Sized>(
        &mut self,
        text: &str,
        render: &mut R,
    ) -> Result<GenerationOutcome, ChatError> {
        self.start_generation(text)?;
        self.run_generation(render).await
    }

    async fn drive<R: Render + ?Sized>(
        &mut self,
        session: &GenerationSession,
        render: &mut R,
    ) -> Result<StopReason, ChatError> {
        let cancel_token = session.cancel_token();
        let response = {
            let chat = self.state.chat(&session.chat_id)?;
            let system = resolve_system_prompt(&self.state.system_prompt, &chat.system_prompt);
            // 占位消息不进入请求
            let history = &chat.messages[..session.message_index];
            let request = build_request(&self.state.record.params, history, system);
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("请求已取消");
                    return Ok(StopReason::Cancelled);
                }
                response = self.model.send(&request) => response?,
            }
        };

        self.state.set_phase(match response {
            CompletionResponse::Stream(_) => Phase::Streaming,
            CompletionResponse::Document(_) => Phase::Waiting,
        });
        let message = self
            .state
            .chat_mut(&session.chat_id)?
            .messages
            .get_mut(session.message_index)
            .ok_or_else(|| ChatError::NoActiveChat(session.chat_id.clone()))?;
        ChatStream::consume(response, message, &cancel_token, render).await
    }

    async fn finish<R: Render + ?Sized>(
        &mut self,
        session: GenerationSession,
        result: Result<StopReason, ChatError>,
        render: &mut R,
    ) -> Result<GenerationOutcome, ChatError> {
        self.state.take_session();
        let now = now_millis();
        let outcome = match result {
            Ok(reason) => {
                let chat = self.state.chat_mut(&session.chat_id)?;
                chat.updated_at = now;
                let content = match chat.messages.get_mut(session.message_index) {
                    Some(message) => {
                        message.timestamp = now;
                        message.content.clone()
                    }
                    None => String::new(),
                };
                render.render_final(&content);
                info!("回应结束 {:?}，{} 字符", reason, content.chars().count());
                let first_exchange = self.state.user_turns(&session.chat_id) == 1;
                Ok(GenerationOutcome {
                    chat_id: session.chat_id,
                    reason,
                    content,
                    first_exchange,
                })
            }
            Err(e) => {
                if e.is_transport() {
                    error!("请求失败: {}", e);
                } else {
                    error!("生成失败: {}", e);
                }
                if let Ok(chat) = self.state.chat_mut(&session.chat_id) {
                    // 移除失败的占位消息，用户消息保留
                    if session.message_index < chat.messages.len() {
                        chat.messages.remove(session.message_index);
                    }
                    chat.updated_at = now;
                }
                Err(e)
            }
        };
        self.state.persist().await;
        outcome
    }
}
