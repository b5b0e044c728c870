use std::time::Duration;

use tokio::time::Instant;

/// 一帧的时长，流式增量在一帧内最多渲染一次
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// 渲染能力，由界面层注入
pub trait Render {
    /// 流式过程中的部分内容（完整累计文本）
    fn render_partial(&mut self, content: &str);
    /// 生成结束后的最终内容
    fn render_final(&mut self, content: &str);
}

/// 合并同一帧内的多次渲染请求
#[derive(Debug)]
pub struct FrameThrottle {
    interval: Duration,
    last: Option<Instant>,
    dirty: bool,
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            dirty: false,
        }
    }

    /// 标记内容已变化，到了下一帧才真正渲染
    pub fn touch<R: Render + ?Sized>(&mut self, render: &mut R, content: &str) {
        self.dirty = true;
        let now = Instant::now();
        let due = self
            .last
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            render.render_partial(content);
            self.last = Some(now);
            self.dirty = false;
        }
    }

    /// 有未渲染内容时，下一帧开始的时刻
    pub fn deadline(&self) -> Option<Instant> {
        if !self.dirty {
            return None;
        }
        Some(self.last.map_or_else(Instant::now, |last| last + self.interval))
    }

    /// 输出尚未渲染的内容
    pub fn flush<R: Render + ?Sized>(&mut self, render: &mut R, content: &str) {
        if self.dirty {
            render.render_partial(content);
            self.last = Some(Instant::now());
            self.dirty = false;
        }
    }
}

impl Default for FrameThrottle {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingRender {
        pub partials: Vec<String>,
        pub finals: Vec<String>,
    }

    impl Render for RecordingRender {
        fn render_partial(&mut self, content: &str) {
            self.partials.push(content.to_string());
        }

        fn render_final(&mut self, content: &str) {
            self.finals.push(content.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn increments_within_one_frame_render_once() {
        let mut render = RecordingRender::default();
        let mut throttle = FrameThrottle::default();
        throttle.touch(&mut render, "a");
        throttle.touch(&mut render, "ab");
        throttle.touch(&mut render, "abc");
        assert_eq!(render.partials, vec!["a"]);

        tokio::time::advance(FRAME_INTERVAL).await;
        throttle.touch(&mut render, "abcd");
        assert_eq!(render.partials, vec!["a", "abcd"]);

        throttle.touch(&mut render, "abcde");
        throttle.flush(&mut render, "abcde");
        assert_eq!(render.partials.last().unwrap(), "abcde");
        assert_eq!(render.partials.len(), 3);

        // 没有新内容时 flush 不渲染
        throttle.flush(&mut render, "abcde");
        assert_eq!(render.partials.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_next_frame_while_dirty() {
        let mut render = RecordingRender::default();
        let mut throttle = FrameThrottle::default();
        assert_eq!(throttle.deadline(), None);

        let start = Instant::now();
        throttle.touch(&mut render, "a");
        assert_eq!(throttle.deadline(), None);
        throttle.touch(&mut render, "ab");
        assert_eq!(throttle.deadline(), Some(start + FRAME_INTERVAL));

        throttle.flush(&mut render, "ab");
        assert_eq!(throttle.deadline(), None);
    }
}
