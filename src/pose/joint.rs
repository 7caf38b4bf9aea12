use serde::{Deserialize, Serialize};

use crate::geometry::Vector3;

/// 深度センサーの 25 関節インデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum JointType {
    SpineBase = 0,
    SpineMid = 1,
    Neck = 2,
    Head = 3,
    ShoulderLeft = 4,
    ElbowLeft = 5,
    WristLeft = 6,
    HandLeft = 7,
    ShoulderRight = 8,
    ElbowRight = 9,
    WristRight = 10,
    HandRight = 11,
    HipLeft = 12,
    KneeLeft = 13,
    AnkleLeft = 14,
    FootLeft = 15,
    HipRight = 16,
    KneeRight = 17,
    AnkleRight = 18,
    FootRight = 19,
    SpineShoulder = 20,
    HandTipLeft = 21,
    ThumbLeft = 22,
    HandTipRight = 23,
    ThumbRight = 24,
}

impl JointType {
    pub const COUNT: usize = 25;

    pub fn from_index(index: usize) -> Option<Self> {
        use JointType::*;
        const ALL: [JointType; JointType::COUNT] = [
            SpineBase, SpineMid, Neck, Head,
            ShoulderLeft, ElbowLeft, WristLeft, HandLeft,
            ShoulderRight, ElbowRight, WristRight, HandRight,
            HipLeft, KneeLeft, AnkleLeft, FootLeft,
            HipRight, KneeRight, AnkleRight, FootRight,
            SpineShoulder, HandTipLeft, ThumbLeft, HandTipRight, ThumbRight,
        ];
        ALL.get(index).copied()
    }
}

/// 手の状態（センサー判定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HandState {
    #[default]
    Unknown,
    Open,
    Closed,
    Lasso,
}

impl HandState {
    /// アクチュエータ向けの開閉判定。Lasso は閉として扱う。
    /// Unknown は判定不能なので None。
    pub fn is_open(&self) -> Option<bool> {
        match self {
            HandState::Open => Some(true),
            HandState::Closed | HandState::Lasso => Some(false),
            HandState::Unknown => None,
        }
    }
}

/// 単一関節
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub position: Vector3,
    /// 関節の向き（クォータニオン x, y, z, w）。肩のみ利用可能
    #[serde(default)]
    pub orientation: Option<[f32; 4]>,
}

impl Default for Joint {
    fn default() -> Self {
        Self::new(Vector3::zeros())
    }
}

impl Joint {
    pub fn new(position: Vector3) -> Self {
        Self {
            position,
            orientation: None,
        }
    }
}

/// 1人分の姿勢スナップショット
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub joints: [Joint; JointType::COUNT],
    #[serde(default)]
    pub left_hand: HandState,
    #[serde(default)]
    pub right_hand: HandState,
}

impl Pose {
    /// インデックスで関節を取得
    pub fn get(&self, joint: JointType) -> &Joint {
        &self.joints[joint as usize]
    }

    pub fn position(&self, joint: JointType) -> Vector3 {
        self.get(joint).position
    }

    pub fn set(&mut self, joint: JointType, position: Vector3) {
        self.joints[joint as usize].position = position;
    }

    pub fn with_joint(mut self, joint: JointType, position: Vector3) -> Self {
        self.set(joint, position);
        self
    }

    pub fn with_hands(mut self, left: HandState, right: HandState) -> Self {
        self.left_hand = left;
        self.right_hand = right;
        self
    }
}

/// センサーが検出した1体分のデータ
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Body {
    pub is_tracked: bool,
    pub pose: Pose,
}

/// 1フレーム分の全ボディ
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyFrame {
    pub bodies: Vec<Body>,
}

impl BodyFrame {
    /// 最初にトラッキングされているボディ
    pub fn first_tracked(&self) -> Option<&Pose> {
        self.bodies.iter().find(|b| b.is_tracked).map(|b| &b.pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_type_from_index() {
        assert_eq!(JointType::from_index(0), Some(JointType::SpineBase));
        assert_eq!(JointType::from_index(20), Some(JointType::SpineShoulder));
        assert_eq!(JointType::from_index(24), Some(JointType::ThumbRight));
        assert_eq!(JointType::from_index(25), None);
    }

    #[test]
    fn test_from_index_matches_discriminant() {
        for i in 0..JointType::COUNT {
            let joint = JointType::from_index(i).unwrap();
            assert_eq!(joint as usize, i);
        }
    }

    #[test]
    fn test_hand_state_is_open() {
        assert_eq!(HandState::Open.is_open(), Some(true));
        assert_eq!(HandState::Closed.is_open(), Some(false));
        assert_eq!(HandState::Lasso.is_open(), Some(false));
        assert_eq!(HandState::Unknown.is_open(), None);
    }

    #[test]
    fn test_pose_set_get() {
        let pose = Pose::default().with_joint(JointType::ElbowRight, Vector3::new(0.1, 0.2, 1.3));
        assert_eq!(pose.position(JointType::ElbowRight), Vector3::new(0.1, 0.2, 1.3));
        assert_eq!(pose.position(JointType::ElbowLeft), Vector3::zeros());
    }

    #[test]
    fn test_first_tracked_body() {
        let a = Pose::default().with_joint(JointType::Head, Vector3::new(1.0, 0.0, 0.0));
        let b = Pose::default().with_joint(JointType::Head, Vector3::new(2.0, 0.0, 0.0));
        let frame = BodyFrame {
            bodies: vec![
                Body { is_tracked: false, pose: a },
                Body { is_tracked: true, pose: b.clone() },
                Body { is_tracked: true, pose: Pose::default() },
            ],
        };
        assert_eq!(frame.first_tracked(), Some(&b));
        assert!(BodyFrame::default().first_tracked().is_none());
    }
}
