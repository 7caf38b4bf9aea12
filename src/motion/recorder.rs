use tracing::info;

use super::sequence::MotionSequence;
use super::stopwatch::Stopwatch;
use crate::frame::ControlFrame;

/// 記録セッション
#[derive(Debug, Default)]
pub struct Recorder {
    sequence: MotionSequence,
    stopwatch: Stopwatch,
    recording: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以前の記録を捨て、経過時間を0から数え直す
    pub fn start(&mut self) {
        self.sequence.clear();
        self.stopwatch.restart();
        self.recording = true;
        info!("recording started");
    }

    /// 記録を止めて、記録した列を返す
    pub fn stop(&mut self) -> MotionSequence {
        self.recording = false;
        self.stopwatch.stop();
        let sequence = std::mem::take(&mut self.sequence);
        info!(
            "recording stopped: {} records, {} ms",
            sequence.len(),
            sequence.duration_ms()
        );
        sequence
    }

    pub fn discard(&mut self) {
        self.recording = false;
        self.sequence.clear();
        self.stopwatch.reset();
        info!("recording discarded");
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.stopwatch.elapsed_ms()
    }

    /// 記録中かつボディがトラッキングされていればフレームを追加する
    pub fn capture(&mut self, frame: &ControlFrame) -> bool {
        if !self.recording || frame.no_tracked_body {
            return false;
        }
        self.sequence.push(self.stopwatch.elapsed_ms(), *frame);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AngleVector, Role};
    use std::time::Duration;

    fn frame(v: f32) -> ControlFrame {
        ControlFrame::new(AngleVector::new([v; Role::COUNT]), true, false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_only_while_recording() {
        let mut rec = Recorder::new();
        assert!(!rec.capture(&frame(1.0)));
        rec.start();
        assert!(rec.capture(&frame(1.0)));
        tokio::time::advance(Duration::from_millis(143)).await;
        assert!(rec.capture(&frame(2.0)));
        let seq = rec.stop();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.records()[0].elapsed_ms, 0);
        assert_eq!(seq.records()[1].elapsed_ms, 143);
        assert!(!rec.capture(&frame(3.0)));
        assert!(rec.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_untracked_frames_skipped() {
        let mut rec = Recorder::new();
        rec.start();
        let mut f = frame(1.0);
        f.no_tracked_body = true;
        assert!(!rec.capture(&f));
        assert_eq!(rec.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_clears_previous() {
        let mut rec = Recorder::new();
        rec.start();
        rec.capture(&frame(1.0));
        tokio::time::advance(Duration::from_millis(1000)).await;
        rec.start();
        assert_eq!(rec.len(), 0);
        assert_eq!(rec.elapsed_ms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard() {
        let mut rec = Recorder::new();
        rec.start();
        rec.capture(&frame(1.0));
        rec.discard();
        assert!(!rec.is_recording());
        assert!(rec.is_empty());
        assert_eq!(rec.elapsed_ms(), 0);
    }
}
