use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use super::joint::{BodyFrame, Pose};

/// センサー側のコラボレータ。制御ループが1ティックに1回ポーリングする。
///
/// `None` はトラッキング中のボディが無いことを表す（エラーではない）。
pub trait PoseSource {
    fn poll(&mut self) -> Option<Pose>;
}

impl<S: PoseSource + ?Sized> PoseSource for Box<S> {
    fn poll(&mut self) -> Option<Pose> {
        (**self).poll()
    }
}

/// 常にボディ無し
pub struct NoSensor;

impl PoseSource for NoSensor {
    fn poll(&mut self) -> Option<Pose> {
        None
    }
}

/// 事前に用意したポーズ列を順に返すソース。使い切った後は `None`
#[derive(Debug, Default)]
pub struct ScriptedSource {
    queue: VecDeque<Option<Pose>>,
}

impl ScriptedSource {
    pub fn new<I: IntoIterator<Item = Option<Pose>>>(poses: I) -> Self {
        Self {
            queue: poses.into_iter().collect(),
        }
    }

    pub fn push(&mut self, pose: Option<Pose>) {
        self.queue.push_back(pose);
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl PoseSource for ScriptedSource {
    fn poll(&mut self) -> Option<Pose> {
        self.queue.pop_front().flatten()
    }
}

/// JSON Lines 形式のスケルトンキャプチャ（1行1 `BodyFrame`）をセンサーとして再生する
pub struct PoseFile {
    frames: Vec<BodyFrame>,
    cursor: usize,
    repeat: bool,
}

impl PoseFile {
    pub fn load<P: AsRef<Path>>(path: P, repeat: bool) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pose capture {}", path.display()))?;
        let frames = Self::parse(&content)
            .with_context(|| format!("Invalid pose capture {}", path.display()))?;
        Ok(Self::from_frames(frames, repeat))
    }

    pub fn parse(content: &str) -> Result<Vec<BodyFrame>> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
            })
            .collect()
    }

    pub fn from_frames(frames: Vec<BodyFrame>, repeat: bool) -> Self {
        Self {
            frames,
            cursor: 0,
            repeat,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl PoseSource for PoseFile {
    fn poll(&mut self) -> Option<Pose> {
        if self.cursor >= self.frames.len() {
            if !self.repeat || self.frames.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let frame = &self.frames[self.cursor];
        self.cursor += 1;
        frame.first_tracked().cloned()
    }
}
