use tracing::{debug, warn};

use crate::actuator::{joint_for, Actuator, Hand, HandCommand, JointId};
use crate::config::{ControlConfig, GateMode};
use crate::frame::{ControlFrame, Role};

/// 1関節分の送信結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointDispatch {
    pub role: Role,
    pub joint: JointId,
    /// 実際に送った値（符号反転後）
    pub angle: f32,
    pub ok: bool,
}

/// 手の送信結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandDispatch {
    /// 人側の手
    pub source: Hand,
    /// 命令を送ったロボット側の手
    pub target: Hand,
    pub command: HandCommand,
    pub ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateReport {
    pub joints: Vec<JointDispatch>,
    pub hands: Vec<HandDispatch>,
}

impl GateReport {
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty() && self.hands.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.joints.iter().filter(|j| !j.ok).count() + self.hands.iter().filter(|h| !h.ok).count()
    }
}

/// アクチュエータへ送る内容を決めるゲート
///
/// 前回送信角度と手の状態はゲートだけが持ち、プロセス終了まで保持する。
#[derive(Debug)]
pub struct UpdateGate {
    mode: GateMode,
    threshold: f32,
    speed: f32,
    last_sent: [f32; Role::COUNT],
    right_hand: Option<bool>,
    left_hand: Option<bool>,
}

impl UpdateGate {
    pub fn new(mode: GateMode, threshold: f32, speed: f32) -> Self {
        Self {
            mode,
            threshold,
            speed,
            last_sent: [0.0; Role::COUNT],
            right_hand: None,
            left_hand: None,
        }
    }

    pub fn from_config(config: &ControlConfig, speed: f32) -> Self {
        Self::new(config.gate, config.angle_threshold, speed)
    }

    pub fn last_sent(&self) -> &[f32; Role::COUNT] {
        &self.last_sent
    }

    fn should_send(&self, role: Role, angle: f32) -> bool {
        match self.mode {
            GateMode::Always => true,
            GateMode::Threshold => (self.last_sent[role.index()] - angle).abs() > self.threshold,
        }
    }

    /// 補正済みフレームを送信する。ボディ無しのフレームでは何も送らない。
    pub fn dispatch<A: Actuator + ?Sized>(
        &mut self,
        frame: &ControlFrame,
        invert: bool,
        actuator: &mut A,
    ) -> GateReport {
        let mut report = GateReport::default();
        if frame.no_tracked_body {
            return report;
        }

        for (role, angle) in frame.angles.iter() {
            if !self.should_send(role, angle) {
                continue;
            }
            self.last_sent[role.index()] = angle;

            let joint = joint_for(role, invert);
            let sent = if joint.is_sign_flipped() { -angle } else { angle };
            let ok = match actuator.set_angle(joint, sent, self.speed) {
                Ok(()) => {
                    debug!("{}: {:.3}", joint, sent);
                    true
                }
                Err(e) => {
                    warn!("set_angle {} failed: {:#}", joint, e);
                    false
                }
            };
            report.joints.push(JointDispatch { role, joint, angle: sent, ok });
        }

        if let Some(d) = Self::update_hand(&mut self.right_hand, Hand::Right, frame.right_hand_open, invert, actuator) {
            report.hands.push(d);
        }
        if let Some(d) = Self::update_hand(&mut self.left_hand, Hand::Left, frame.left_hand_open, invert, actuator) {
            report.hands.push(d);
        }
        report
    }

    /// 状態が変化したときだけ開閉命令を送る
    fn update_hand<A: Actuator + ?Sized>(
        status: &mut Option<bool>,
        source: Hand,
        open: bool,
        invert: bool,
        actuator: &mut A,
    ) -> Option<HandDispatch> {
        if *status == Some(open) {
            return None;
        }
        *status = Some(open);

        let target = if invert { source.mirrored() } else { source };
        let command = HandCommand::from_open(open);
        let ok = match actuator.set_hand(target, command) {
            Ok(()) => {
                debug!("{}: {}", target.name(), command.as_str());
                true
            }
            Err(e) => {
                warn!("set_hand {} failed: {:#}", target.name(), e);
                false
            }
        };
        Some(HandDispatch { source, target, command, ok })
    }
}
