use log::debug;
use serde::Deserialize;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// 按行切分的缓冲区，最后一段不完整的内容保留到下一轮
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加文本并取出所有完整的行（不含换行符）
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buf.push_str(text);
        let Some(last_newline) = self.buf.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, rest);
        // complete 以换行结尾，lines() 同时去掉 \r\n 中的 \r
        complete.lines().map(str::to_string).collect()
    }

    /// 流结束时剩余的不完整行
    pub fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            let rest = std::mem::take(&mut self.buf);
            Some(rest.strip_suffix('\r').unwrap_or(&rest).to_string())
        }
    }
}

/// 单行 SSE 数据的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// 文本增量
    Delta(String),
    /// 结束标记
    Done,
    /// 非 data 行、空增量或无法解析的数据，直接忽略
    Skip,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// 解析一行 SSE
pub fn parse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return SseLine::Skip;
    };
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == DONE_SENTINEL {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|s| !s.is_empty())
            .map(SseLine::Delta)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            debug!("忽略无法解析的数据行: {} ({})", data, e);
            SseLine::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_line_is_kept_for_next_push() {
        let mut buf = LineBuffer::new();
        assert!(buf.push("data: {\"a\"").is_empty());
        let lines = buf.push(":1}\r\ndata: x\n\ndata: tail");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: x", ""]);
        assert_eq!(buf.take_rest().as_deref(), Some("data: tail"));
        assert_eq!(buf.take_rest(), None);
    }

    #[test]
    fn delta_content_is_extracted() {
        let line = r#"data: {"choices":[{"delta":{"content":"He"}}]}"#;
        assert_eq!(parse_line(line), SseLine::Delta("He".into()));
        let no_space = r#"data:{"choices":[{"delta":{"content":"llo"}}]}"#;
        assert_eq!(parse_line(no_space), SseLine::Delta("llo".into()));
    }

    #[test]
    fn sentinel_and_noise() {
        assert_eq!(parse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_line("data: {not json"), SseLine::Skip);
        assert_eq!(parse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_line("event: message"), SseLine::Skip);
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(parse_line(r#"data: {"choices":[]}"#), SseLine::Skip);
    }
}
