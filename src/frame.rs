use serde::{Deserialize, Serialize};

/// 角度ベクトルのスロット。並び順が角度ベクトルの添字になる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum Role {
    RightShoulderRoll = 0,
    LeftShoulderRoll = 1,
    RightElbowRoll = 2,
    LeftElbowRoll = 3,
    RightShoulderPitch = 4,
    LeftShoulderPitch = 5,
}

impl Role {
    pub const COUNT: usize = 6;

    pub const ALL: [Role; Role::COUNT] = [
        Role::RightShoulderRoll,
        Role::LeftShoulderRoll,
        Role::RightElbowRoll,
        Role::LeftElbowRoll,
        Role::RightShoulderPitch,
        Role::LeftShoulderPitch,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_pitch(self) -> bool {
        matches!(self, Role::RightShoulderPitch | Role::LeftShoulderPitch)
    }
}

/// 6関節分の角度（ラジアン）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngleVector(pub [f32; Role::COUNT]);

impl AngleVector {
    pub fn new(angles: [f32; Role::COUNT]) -> Self {
        Self(angles)
    }

    pub fn get(&self, role: Role) -> f32 {
        self.0[role.index()]
    }

    pub fn set(&mut self, role: Role, angle: f32) {
        self.0[role.index()] = angle;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, f32)> + '_ {
        Role::ALL.iter().map(move |&r| (r, self.get(r)))
    }
}

/// 1ティック分の制御データ
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlFrame {
    pub angles: AngleVector,
    pub right_hand_open: bool,
    pub left_hand_open: bool,
    /// true のとき `angles` は前回値のままで、送信も記録もしてはならない
    pub no_tracked_body: bool,
}

impl ControlFrame {
    pub fn new(angles: AngleVector, right_hand_open: bool, left_hand_open: bool) -> Self {
        Self {
            angles,
            right_hand_open,
            left_hand_open,
            no_tracked_body: false,
        }
    }

    pub fn is_tracked(&self) -> bool {
        !self.no_tracked_body
    }
}
