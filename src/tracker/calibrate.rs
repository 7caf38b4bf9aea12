use std::sync::Arc;

use crate::config::CalibrationConfig;
use crate::frame::{ControlFrame, Role};

/// オフセット減算と肩ピッチのクランプ
///
/// 設定は不変値として保持し、変更時は `Arc` ごと差し替える。
#[derive(Debug, Clone)]
pub struct Calibrator {
    config: Arc<CalibrationConfig>,
}

impl Calibrator {
    pub fn new(config: Arc<CalibrationConfig>) -> Self {
        Self { config }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(Arc::new(config.clone()))
    }

    pub fn config(&self) -> &Arc<CalibrationConfig> {
        &self.config
    }

    pub fn set_config(&mut self, config: Arc<CalibrationConfig>) {
        self.config = config;
    }

    pub fn invert(&self) -> bool {
        self.config.invert
    }

    pub fn apply(&self, frame: &ControlFrame) -> ControlFrame {
        let mut out = *frame;
        for role in Role::ALL {
            let mut angle = frame.angles.get(role) - self.config.offsets[role.index()];
            if role.is_pitch() {
                angle = angle.clamp(self.config.pitch_min, self.config.pitch_max);
            }
            out.angles.set(role, angle);
        }
        out
    }
}
