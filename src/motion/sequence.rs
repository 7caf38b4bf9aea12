use serde::{Deserialize, Serialize};

use crate::frame::ControlFrame;

/// 記録開始からの経過時間付きフレーム
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionRecord {
    pub elapsed_ms: u64,
    /// オフセット適用前のフレーム
    pub frame: ControlFrame,
}

/// 時刻順のモーション列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSequence {
    records: Vec<MotionRecord>,
}

impl MotionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 時刻が逆行するレコードがあれば、その添字を返す
    pub fn from_records(records: Vec<MotionRecord>) -> Result<Self, usize> {
        match first_out_of_order(&records) {
            Some(index) => Err(index),
            None => Ok(Self { records }),
        }
    }

    /// 末尾に追加する。直前より古い時刻は直前の時刻に揃える
    pub fn push(&mut self, elapsed_ms: u64, frame: ControlFrame) {
        let elapsed_ms = match self.records.last() {
            Some(last) => elapsed_ms.max(last.elapsed_ms),
            None => elapsed_ms,
        };
        self.records.push(MotionRecord { elapsed_ms, frame });
    }

    pub fn records(&self) -> &[MotionRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MotionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 最後のレコードの時刻
    pub fn duration_ms(&self) -> u64 {
        self.records.last().map(|r| r.elapsed_ms).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl<'a> IntoIterator for &'a MotionSequence {
    type Item = &'a MotionRecord;
    type IntoIter = std::slice::Iter<'a, MotionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn first_out_of_order(records: &[MotionRecord]) -> Option<usize> {
    records
        .windows(2)
        .position(|w| w[1].elapsed_ms < w[0].elapsed_ms)
        .map(|i| i + 1)
}
