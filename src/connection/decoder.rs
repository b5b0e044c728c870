/// 增量 UTF-8 解码器
///
/// 网络分块可能把一个多字节字符切成两半，未完成的字节留到下一次 push 再解码。
/// 非法字节序列替换为 U+FFFD，不会中断解码。
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解码一块字节，返回可以确定的文本
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(s) => {
                    out.push_str(s);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to 之前的字节已验证
                    out.push_str(&String::from_utf8_lossy(
                        &self.pending[start..start + valid],
                    ));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += valid + bad;
                        }
                        None => {
                            // 末尾不完整，等待后续字节
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }

    /// 流结束时输出剩余字节
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_multibyte_character_is_carried_over() {
        let bytes = "你好".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut text = decoder.push(&bytes[..1]);
        assert_eq!(text, "");
        text += &decoder.push(&bytes[1..4]);
        text += &decoder.push(&bytes[4..]);
        text += &decoder.finish();
        assert_eq!(text, "你好");
    }

    #[test]
    fn invalid_bytes_become_replacement() {
        let mut decoder = Utf8Decoder::new();
        let text = decoder.push(&[b'a', 0xFF, b'b']);
        assert_eq!(text, "a\u{FFFD}b");
    }

    #[test]
    fn truncated_tail_is_flushed_lossy() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(&[b'x', 0xE4, 0xBD]), "x");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
