use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::sequence::{MotionRecord, MotionSequence};

/// 再生結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { played: usize },
    Cancelled { played: usize },
}

impl PlaybackOutcome {
    pub fn played(&self) -> usize {
        match self {
            PlaybackOutcome::Completed { played } | PlaybackOutcome::Cancelled { played } => *played,
        }
    }
}

/// 再生位置と開始時刻を持つ再生状態
///
/// レコードは再生開始から `elapsed_ms` 経過した時刻（期限）より前には取り出せない。
#[derive(Debug, Clone)]
pub struct Player {
    sequence: MotionSequence,
    next: usize,
    start: Instant,
}

impl Player {
    /// 現在時刻を再生開始時刻として作る
    pub fn new(sequence: MotionSequence) -> Self {
        info!("playback started: {} records, {} ms", sequence.len(), sequence.duration_ms());
        Self {
            sequence,
            next: 0,
            start: Instant::now(),
        }
    }

    /// 次のレコードの期限。再生し終えていれば None
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sequence
            .records()
            .get(self.next)
            .map(|r| self.start + Duration::from_millis(r.elapsed_ms))
    }

    /// 期限を過ぎていれば次のレコードを返して進める
    pub fn take_due(&mut self) -> Option<MotionRecord> {
        let deadline = self.next_deadline()?;
        if Instant::now() < deadline {
            return None;
        }
        let record = self.sequence.records()[self.next];
        self.next += 1;
        Some(record)
    }

    pub fn played(&self) -> usize {
        self.next
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.sequence.len()
    }

    /// 次のレコードの期限まで待って返す。終端または `cancel` で None
    pub async fn next_record(&mut self, cancel: &CancellationToken) -> Option<MotionRecord> {
        loop {
            let deadline = self.next_deadline()?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = sleep_until(deadline) => {}
            }
            if let Some(record) = self.take_due() {
                return Some(record);
            }
        }
    }
}

/// 記録時の時間間隔を保って順に `on_record` を呼ぶ
///
/// 待機中に `cancel` されたら残りを捨てて戻る。
pub async fn play<F>(sequence: MotionSequence, cancel: &CancellationToken, mut on_record: F) -> PlaybackOutcome
where
    F: FnMut(&MotionRecord),
{
    let mut player = Player::new(sequence);
    while let Some(record) = player.next_record(cancel).await {
        on_record(&record);
    }
    if player.is_finished() {
        info!("playback finished");
        PlaybackOutcome::Completed { played: player.played() }
    } else {
        info!("playback cancelled after {} records", player.played());
        PlaybackOutcome::Cancelled { played: player.played() }
    }
}
