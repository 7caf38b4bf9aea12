use anyhow::{bail, Result};
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::fmt;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::config::ActuatorConfig;
use crate::frame::Role;

/// ロボット側の関節ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointId {
    RShoulderRoll,
    LShoulderRoll,
    RElbowRoll,
    LElbowRoll,
    RShoulderPitch,
    LShoulderPitch,
}

impl JointId {
    pub fn name(&self) -> &'static str {
        match self {
            JointId::RShoulderRoll => "RShoulderRoll",
            JointId::LShoulderRoll => "LShoulderRoll",
            JointId::RElbowRoll => "RElbowRoll",
            JointId::LElbowRoll => "LElbowRoll",
            JointId::RShoulderPitch => "RShoulderPitch",
            JointId::LShoulderPitch => "LShoulderPitch",
        }
    }

    /// ロボットの関節軸の向きが人体と逆なので符号反転して送る関節
    pub fn is_sign_flipped(&self) -> bool {
        matches!(self, JointId::RShoulderRoll | JointId::LElbowRoll)
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const JOINT_TABLE: [JointId; Role::COUNT] = [
    JointId::RShoulderRoll,
    JointId::LShoulderRoll,
    JointId::RElbowRoll,
    JointId::LElbowRoll,
    JointId::RShoulderPitch,
    JointId::LShoulderPitch,
];

const INVERTED_JOINT_TABLE: [JointId; Role::COUNT] = [
    JointId::LShoulderRoll,
    JointId::RShoulderRoll,
    JointId::LElbowRoll,
    JointId::RElbowRoll,
    JointId::LShoulderPitch,
    JointId::RShoulderPitch,
];

/// ロールを送信先の関節に対応付ける。`invert` なら左右を入れ替える
pub fn joint_for(role: Role, invert: bool) -> JointId {
    if invert {
        INVERTED_JOINT_TABLE[role.index()]
    } else {
        JOINT_TABLE[role.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub fn name(&self) -> &'static str {
        match self {
            Hand::Left => "LHand",
            Hand::Right => "RHand",
        }
    }

    pub fn mirrored(&self) -> Hand {
        match self {
            Hand::Left => Hand::Right,
            Hand::Right => Hand::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandCommand {
    Open,
    Close,
}

impl HandCommand {
    pub fn from_open(open: bool) -> Self {
        if open {
            HandCommand::Open
        } else {
            HandCommand::Close
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandCommand::Open => "open",
            HandCommand::Close => "close",
        }
    }
}

/// スティフネスをかける関節チェーン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    Head,
    LArm,
    RArm,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Head, Chain::LArm, Chain::RArm];

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Head => "Head",
            Chain::LArm => "LArm",
            Chain::RArm => "RArm",
        }
    }
}

/// ロボット側のコラボレータ
///
/// 各呼び出しはネットワーク越しでブロックしうる。失敗は呼び出し側で握りつぶして
/// ログに残し、次のティックで上書きされる。
pub trait Actuator: Send {
    fn set_stiffness(&mut self, chain: Chain, stiffness: f32, time_secs: f32) -> Result<()>;
    fn set_angle(&mut self, joint: JointId, angle: f32, speed: f32) -> Result<()>;
    fn set_hand(&mut self, hand: Hand, command: HandCommand) -> Result<()>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn set_stiffness(&mut self, chain: Chain, stiffness: f32, time_secs: f32) -> Result<()> {
        (**self).set_stiffness(chain, stiffness, time_secs)
    }

    fn set_angle(&mut self, joint: JointId, angle: f32, speed: f32) -> Result<()> {
        (**self).set_angle(joint, angle, speed)
    }

    fn set_hand(&mut self, hand: Hand, command: HandCommand) -> Result<()> {
        (**self).set_hand(hand, command)
    }
}

/// 接続時: Head / LArm / RArm にスティフネスをかける
pub fn engage<A: Actuator + ?Sized>(actuator: &mut A, config: &ActuatorConfig) -> Result<()> {
    for chain in Chain::ALL {
        actuator.set_stiffness(chain, config.stiffness, config.stiffness_time)?;
    }
    Ok(())
}

/// 終了時: スティフネスを抜く
pub fn release<A: Actuator + ?Sized>(actuator: &mut A) -> Result<()> {
    for chain in Chain::ALL {
        actuator.set_stiffness(chain, 0.0, 0.0)?;
    }
    Ok(())
}

pub const ANGLE_ADDR: &str = "/nao/angle";
pub const HAND_ADDR: &str = "/nao/hand";
pub const STIFFNESS_ADDR: &str = "/nao/stiffness";

/// 関節角度メッセージ
/// 引数: joint, angle(rad), speed
pub fn build_angle_message(joint: JointId, angle: f32, speed: f32) -> OscMessage {
    OscMessage {
        addr: ANGLE_ADDR.to_string(),
        args: vec![
            OscType::String(joint.name().to_string()),
            OscType::Float(angle),
            OscType::Float(speed),
        ],
    }
}

/// 手の開閉メッセージ
/// 引数: hand, "open" | "close"
pub fn build_hand_message(hand: Hand, command: HandCommand) -> OscMessage {
    OscMessage {
        addr: HAND_ADDR.to_string(),
        args: vec![
            OscType::String(hand.name().to_string()),
            OscType::String(command.as_str().to_string()),
        ],
    }
}

/// スティフネスメッセージ
/// 引数: chain, stiffness(0..1), time(s)
pub fn build_stiffness_message(chain: Chain, stiffness: f32, time_secs: f32) -> OscMessage {
    OscMessage {
        addr: STIFFNESS_ADDR.to_string(),
        args: vec![
            OscType::String(chain.name().to_string()),
            OscType::Float(stiffness),
            OscType::Float(time_secs),
        ],
    }
}

/// OSCメッセージをバイト列にエンコード
pub fn encode_osc_message(msg: OscMessage) -> Result<Vec<u8>> {
    let encoded = encoder::encode(&OscPacket::Message(msg))?;
    Ok(encoded)
}

/// ロボット側OSCブリッジへUDPで送るクライアント
pub struct OscActuator {
    socket: UdpSocket,
    target_addr: String,
}

impl OscActuator {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }

    fn send(&self, msg: OscMessage) -> Result<()> {
        let data = encode_osc_message(msg)?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }
}

impl Actuator for OscActuator {
    fn set_stiffness(&mut self, chain: Chain, stiffness: f32, time_secs: f32) -> Result<()> {
        self.send(build_stiffness_message(chain, stiffness, time_secs))
    }

    fn set_angle(&mut self, joint: JointId, angle: f32, speed: f32) -> Result<()> {
        self.send(build_angle_message(joint, angle, speed))
    }

    fn set_hand(&mut self, hand: Hand, command: HandCommand) -> Result<()> {
        self.send(build_hand_message(hand, command))
    }
}

/// 送信されたコマンド
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    Stiffness { chain: Chain, stiffness: f32 },
    Angle { joint: JointId, angle: f32, speed: f32 },
    Hand { hand: Hand, command: HandCommand },
}

/// 送信コマンドを時刻付きで記録するアクチュエータ
///
/// クローンは同じ記録を共有するので、制御ループへ渡した後も中身を確認できる。
#[derive(Clone, Default)]
pub struct CaptureActuator {
    log: Arc<Mutex<Vec<(Instant, ActuatorCommand)>>>,
    failing: Arc<Mutex<bool>>,
}

impl CaptureActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// true の間は全コマンドを失敗させる（記録はしない）
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut f) = self.failing.lock() {
            *f = failing;
        }
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.timed_commands().into_iter().map(|(_, c)| c).collect()
    }

    pub fn timed_commands(&self) -> Vec<(Instant, ActuatorCommand)> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut l) = self.log.lock() {
            l.clear();
        }
    }

    fn push(&self, command: ActuatorCommand) -> Result<()> {
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            bail!("actuator unreachable");
        }
        if let Ok(mut l) = self.log.lock() {
            l.push((Instant::now(), command));
        }
        Ok(())
    }
}

impl Actuator for CaptureActuator {
    fn set_stiffness(&mut self, chain: Chain, stiffness: f32, _time_secs: f32) -> Result<()> {
        self.push(ActuatorCommand::Stiffness { chain, stiffness })
    }

    fn set_angle(&mut self, joint: JointId, angle: f32, speed: f32) -> Result<()> {
        self.push(ActuatorCommand::Angle { joint, angle, speed })
    }

    fn set_hand(&mut self, hand: Hand, command: HandCommand) -> Result<()> {
        self.push(ActuatorCommand::Hand { hand, command })
    }
}
