use crate::frame::{AngleVector, ControlFrame, Role};
use crate::geometry::{angle_3d, angle_xy, angle_xz, angle_yz, with_min_depth, Vector3};
use crate::pose::{JointType, Pose};

/// 推定関節の奥行きが負になった場合に使う値（メートル）
pub const INFERRED_DEPTH_CLAMP: f32 = 0.1;

/// 肩ロールの補正係数
const SHOULDER_ROLL_DIVISOR: f32 = 1.2;
/// 肩ピッチのゲイン
const SHOULDER_PITCH_GAIN: f32 = 1.5;

/// 片腕分の関節位置
#[derive(Debug, Clone, Copy)]
struct Arm {
    shoulder: Vector3,
    elbow: Vector3,
    wrist: Vector3,
    hip: Vector3,
}

impl Arm {
    fn right(pose: &Pose) -> Self {
        Self::read(pose, JointType::ShoulderRight, JointType::ElbowRight, JointType::WristRight, JointType::HipRight)
    }

    fn left(pose: &Pose) -> Self {
        Self::read(pose, JointType::ShoulderLeft, JointType::ElbowLeft, JointType::WristLeft, JointType::HipLeft)
    }

    fn read(pose: &Pose, shoulder: JointType, elbow: JointType, wrist: JointType, hip: JointType) -> Self {
        let at = |j| with_min_depth(&pose.position(j), INFERRED_DEPTH_CLAMP);
        Self {
            shoulder: at(shoulder),
            elbow: at(elbow),
            wrist: at(wrist),
            hip: at(hip),
        }
    }

    /// 肩ロール
    ///
    /// 肩のXと肘のY/Zを持つ補助点で XZ 平面の角度を取り、腰基準の XY 平面の角度と掛けて
    /// 1.2 で割る。物理的な角度ではなく経験的に合わせた値。
    fn shoulder_roll(&self) -> f32 {
        let xz_ref = Vector3::new(self.shoulder.x, self.elbow.y, self.elbow.z);
        let xz = angle_xz(&xz_ref, &self.shoulder, &self.elbow);
        let xy = angle_xy(&self.hip, &self.shoulder, &self.elbow);
        (xz * xy) / SHOULDER_ROLL_DIVISOR
    }

    fn elbow_roll(&self) -> f32 {
        -angle_3d(&self.shoulder, &self.elbow, &self.wrist)
    }

    fn shoulder_pitch(&self) -> f32 {
        -angle_yz(&self.hip, &self.shoulder, &self.elbow) * SHOULDER_PITCH_GAIN
    }
}

/// ポーズから補正前の `ControlFrame` を作る
///
/// 前回の結果を保持する。ボディが無いティックでは角度を前回値のまま
/// `no_tracked_body` を立て、手の状態が Unknown の側は前回の開閉を引き継ぐ。
#[derive(Debug, Default)]
pub struct PoseExtractor {
    last: ControlFrame,
}

impl PoseExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract(&mut self, pose: Option<&Pose>) -> ControlFrame {
        let pose = match pose {
            Some(p) => p,
            None => {
                self.last.no_tracked_body = true;
                return self.last;
            }
        };

        let right = Arm::right(pose);
        let left = Arm::left(pose);

        let mut angles = AngleVector::default();
        angles.set(Role::RightShoulderRoll, right.shoulder_roll());
        angles.set(Role::LeftShoulderRoll, left.shoulder_roll());
        angles.set(Role::RightElbowRoll, right.elbow_roll());
        angles.set(Role::LeftElbowRoll, left.elbow_roll());
        angles.set(Role::RightShoulderPitch, right.shoulder_pitch());
        angles.set(Role::LeftShoulderPitch, left.shoulder_pitch());

        let frame = ControlFrame {
            angles,
            right_hand_open: pose.right_hand.is_open().unwrap_or(self.last.right_hand_open),
            left_hand_open: pose.left_hand.is_open().unwrap_or(self.last.left_hand_open),
            no_tracked_body: false,
        };
        self.last = frame;
        frame
    }

    pub fn last(&self) -> &ControlFrame {
        &self.last
    }
}
