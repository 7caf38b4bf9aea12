use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::frame::Role;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// 角度送信の判定方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// 毎ティック全関節を送信する
    #[default]
    Always,
    /// 前回送信値から閾値を超えて変化した関節だけ送信する
    Threshold,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// ティック周期（ミリ秒）
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub gate: GateMode,
    /// `gate = "threshold"` のときの変化量閾値（ラジアン）
    #[serde(default = "default_angle_threshold")]
    pub angle_threshold: f32,
}

/// 角度補正パラメータ。実行中は `Arc` で丸ごと差し替える
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// ロールごとのオフセット（ラジアン、生角度から減算）
    #[serde(default = "default_offsets")]
    pub offsets: [f32; Role::COUNT],
    /// 肩ピッチの下限
    #[serde(default = "default_pitch_min")]
    pub pitch_min: f32,
    /// 肩ピッチの上限
    #[serde(default = "default_pitch_max")]
    pub pitch_max: f32,
    /// 左右反転（鏡像）制御
    #[serde(default = "default_invert")]
    pub invert: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorConfig {
    /// OSCブリッジのアドレス
    #[serde(default = "default_actuator_addr")]
    pub addr: String,
    /// 関節移動速度（最大速度に対する割合）
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_stiffness")]
    pub stiffness: f32,
    /// スティフネス補間時間（秒）
    #[serde(default = "default_stiffness_time")]
    pub stiffness_time: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorConfig {
    /// JSON Lines のスケルトンキャプチャ。未指定ならボディ無し
    #[serde(default)]
    pub pose_file: Option<String>,
    #[serde(default)]
    pub repeat: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_recording_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// `RUST_LOG` 未設定時のフィルタ
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ceil(1000 / 7)
fn default_period_ms() -> u64 { 143 }
fn default_angle_threshold() -> f32 { 0.1 }
fn default_offsets() -> [f32; Role::COUNT] { [0.8, 0.8, -2.5, -2.5, -2.65, -2.65] }
fn default_pitch_min() -> f32 { -2.0 }
fn default_pitch_max() -> f32 { 2.0 }
fn default_invert() -> bool { true }
fn default_actuator_addr() -> String { "127.0.0.1:9570".to_string() }
fn default_speed() -> f32 { 0.15 }
fn default_stiffness() -> f32 { 1.0 }
fn default_stiffness_time() -> f32 { 1.0 }
fn default_recording_dir() -> String { "recordings".to_string() }
fn default_log_dir() -> String { "logs".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            gate: GateMode::default(),
            angle_threshold: default_angle_threshold(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            offsets: default_offsets(),
            pitch_min: default_pitch_min(),
            pitch_max: default_pitch_max(),
            invert: default_invert(),
        }
    }
}

impl CalibrationConfig {
    pub fn with_invert(&self, invert: bool) -> Self {
        Self {
            invert,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pitch_min <= self.pitch_max) {
            bail!(
                "calibration.pitch_min ({}) must not exceed pitch_max ({})",
                self.pitch_min,
                self.pitch_max
            );
        }
        if self.offsets.iter().any(|o| !o.is_finite()) {
            bail!("calibration.offsets must be finite");
        }
        Ok(())
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            addr: default_actuator_addr(),
            speed: default_speed(),
            stiffness: default_stiffness(),
            stiffness_time: default_stiffness_time(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self { dir: default_recording_dir() }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルが無ければデフォルト値で続行する
    ///
    /// ファイルがあって読めない・解析できない・値が不正な場合はエラー。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config {}", path.display()))
            }
        };
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.control.period_ms == 0 {
            bail!("control.period_ms must be positive");
        }
        if !(self.control.angle_threshold >= 0.0) {
            bail!("control.angle_threshold must be non-negative");
        }
        self.calibration.validate()
    }
}
