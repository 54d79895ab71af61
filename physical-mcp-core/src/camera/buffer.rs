//! Bounded ring buffer of recent frames with a wake signal for waiters.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use super::frame::Frame;

pub const DEFAULT_MAX_FRAMES: usize = 300;

/// Fixed-size ring buffer for recent frames with time-based queries.
///
/// One mutex guards the deque; a `Notify` pulses on every push so
/// `wait_for_frame` callers (MJPEG stream, SSE bridge) wake promptly
/// instead of polling.
pub struct FrameBuffer {
    max_frames: usize,
    buffer: Mutex<VecDeque<Frame>>,
    new_frame: Notify,
}

impl FrameBuffer {
    pub fn new(max_frames: usize) -> Self {
        FrameBuffer {
            max_frames: max_frames.max(1),
            buffer: Mutex::new(VecDeque::with_capacity(max_frames.max(1))),
            new_frame: Notify::new(),
        }
    }

    pub async fn push(&self, frame: Frame) {
        let mut guard = self.buffer.lock().await;
        if guard.len() >= self.max_frames {
            guard.pop_front();
        }
        guard.push_back(frame);
        drop(guard);
        self.new_frame.notify_waiters();
    }

    pub async fn latest(&self) -> Option<Frame> {
        self.buffer.lock().await.back().cloned()
    }

    pub async fn get_frames_since(&self, since: DateTime<Utc>) -> Vec<Frame> {
        self.buffer
            .lock()
            .await
            .iter()
            .filter(|f| f.timestamp >= since)
            .cloned()
            .collect()
    }

    /// `count` evenly-spaced frames: all of them if the buffer holds `count`
    /// or fewer, otherwise indices `floor(i * size / count)`.
    pub async fn get_sampled(&self, count: usize) -> Vec<Frame> {
        let guard = self.buffer.lock().await;
        if count == 0 || guard.is_empty() {
            return Vec::new();
        }
        if guard.len() <= count {
            return guard.iter().cloned().collect();
        }
        let size = guard.len();
        (0..count)
            .map(|i| guard[i * size / count].clone())
            .collect()
    }

    pub async fn size(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Exported for test harness use; the perception loop never calls this
    /// in normal operation.
    pub async fn clear(&self) {
        self.buffer.lock().await.clear();
    }

    /// Wait until the next push, or `timeout` elapses, then return `latest()`.
    pub async fn wait_for_frame(&self, timeout: Duration) -> Option<Frame> {
        let notified = self.new_frame.notified();
        let _ = tokio::time::timeout(timeout, notified).await;
        self.latest().await
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        FrameBuffer::new(DEFAULT_MAX_FRAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn frame(seq: u64) -> Frame {
        Frame::new(DynamicImage::new_rgb8(4, 4), "test:0", seq)
    }

    #[tokio::test]
    async fn size_never_exceeds_max_frames() {
        let buf = FrameBuffer::new(3);
        for i in 1..=10 {
            buf.push(frame(i)).await;
        }
        assert_eq!(buf.size().await, 3);
    }

    #[tokio::test]
    async fn latest_returns_last_pushed() {
        let buf = FrameBuffer::new(3);
        for i in 1..=5 {
            buf.push(frame(i)).await;
        }
        assert_eq!(buf.latest().await.unwrap().sequence_number, 5);
    }

    #[tokio::test]
    async fn get_sampled_returns_all_when_fewer_than_count() {
        let buf = FrameBuffer::new(300);
        for i in 1..=3 {
            buf.push(frame(i)).await;
        }
        let sampled = buf.get_sampled(10).await;
        assert_eq!(sampled.len(), 3);
    }

    #[tokio::test]
    async fn get_sampled_returns_evenly_spaced_subset() {
        let buf = FrameBuffer::new(300);
        for i in 1..=10 {
            buf.push(frame(i)).await;
        }
        let sampled = buf.get_sampled(5).await;
        let seqs: Vec<u64> = sampled.iter().map(|f| f.sequence_number).collect();
        assert_eq!(seqs, vec![1, 3, 5, 7, 9]);
    }

    #[tokio::test]
    async fn clear_empties_buffer() {
        let buf = FrameBuffer::new(3);
        buf.push(frame(1)).await;
        buf.clear().await;
        assert_eq!(buf.size().await, 0);
        assert!(buf.latest().await.is_none());
    }

    #[tokio::test]
    async fn wait_for_frame_times_out_and_returns_latest() {
        let buf = FrameBuffer::new(3);
        buf.push(frame(1)).await;
        let result = buf
            .wait_for_frame(Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(result.sequence_number, 1);
    }

    #[tokio::test]
    async fn wait_for_frame_wakes_on_push() {
        let buf = std::sync::Arc::new(FrameBuffer::new(3));
        let buf2 = buf.clone();
        let handle = tokio::spawn(async move { buf2.wait_for_frame(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        buf.push(frame(7)).await;
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.sequence_number, 7);
    }
}
