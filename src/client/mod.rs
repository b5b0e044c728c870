use std::io::{self, BufRead, Write};

use log::{info, warn};
use tokio::sync::mpsc;

use crate::chat::{Chat, Render};
use crate::model::AgentModel;

/// 终端渲染：只输出新增的部分
pub struct TerminalRenderer<W: Write> {
    out: W,
    printed: usize,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_new(&mut self, content: &str) {
        // 内容只追加，已输出的前缀不会变化
        if let Some(rest) = content.get(self.printed..) {
            let _ = self.out.write_all(rest.as_bytes());
            self.printed = content.len();
        }
        let _ = self.out.flush();
    }
}

impl<W: Write> Render for TerminalRenderer<W> {
    fn render_partial(&mut self, content: &str) {
        self.write_new(content);
    }

    fn render_final(&mut self, content: &str) {
        self.write_new(content);
        let _ = self.out.write_all(b"\n");
        let _ = self.out.flush();
        self.printed = 0;
    }
}

/// Ctrl-C 的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// 停止了进行中的生成
    Cancelled,
    /// 没有生成任务，退出交互
    Exit,
}

/// 有生成任务时停止生成，否则退出
pub fn on_interrupt<M: AgentModel>(chat: &Chat<M>) -> Interrupt {
    if chat.cancel() {
        Interrupt::Cancelled
    } else {
        Interrupt::Exit
    }
}

/// 整个进程只注册一次 Ctrl-C 监听，之后每次按键都转成一条消息
pub fn spawn_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("无法监听 Ctrl-C: {}", e);
                break;
            }
            info!("收到 Ctrl-C");
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// 在独立线程中按行读取标准输入
pub fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chat::ChatState;
    use crate::connection::CompletionResponse;
    use crate::error::ChatError;
    use crate::model::CompletionRequest;
    use crate::store::{MemoryStore, StudioRecord};

    struct Silent;

    impl AgentModel for Silent {
        async fn send(
            &self,
            _request: &CompletionRequest<'_>,
        ) -> Result<CompletionResponse, ChatError> {
            futures::future::pending().await
        }
    }

    fn chat() -> Chat<Silent> {
        let mut record = StudioRecord::default();
        record.api_key = "sk-test".into();
        Chat::new(ChatState::new(record, Arc::new(MemoryStore::new())), Silent)
    }

    #[test]
    fn interrupt_at_prompt_exits() {
        let chat = chat();
        assert_eq!(on_interrupt(&chat), Interrupt::Exit);
    }

    #[test]
    fn interrupt_during_generation_cancels_it() {
        let mut chat = chat();
        let token = chat.start_generation("hi").unwrap();
        assert_eq!(on_interrupt(&chat), Interrupt::Cancelled);
        assert!(token.is_cancelled());
        assert!(chat.is_running());
    }

    #[test]
    fn only_new_suffix_is_written() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.render_partial("你");
        renderer.render_partial("你好");
        renderer.render_final("你好！");
        renderer.render_final("next");
        let out = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(out, "你好！\nnext\n");
    }
}
