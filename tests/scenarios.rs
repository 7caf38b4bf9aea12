use std::f32::consts::PI;
use std::time::Duration;
use tokio::time::{advance, Instant};
use tokio_util::sync::CancellationToken;

use nao_mirror::actuator::{ActuatorCommand, CaptureActuator, JointId};
use nao_mirror::config::{CalibrationConfig, Config};
use nao_mirror::control::ControlLoop;
use nao_mirror::frame::Role;
use nao_mirror::geometry::Vector3;
use nao_mirror::motion::{MotionSequence, PlaybackOutcome};
use nao_mirror::pose::{HandState, JointType, Pose, ScriptedSource};
use nao_mirror::tracker::{Calibrator, PoseExtractor};

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

fn config_without_invert() -> Config {
    let mut config = Config::default();
    config.calibration.invert = false;
    config
}

/// 右肘の曲げ具合だけが違う姿勢
fn pose_with_bend(bend: f32) -> Pose {
    Pose::default()
        .with_joint(JointType::ShoulderRight, Vector3::new(0.2, 0.0, 2.0))
        .with_joint(JointType::ElbowRight, Vector3::new(0.3, -0.25, 2.0))
        .with_joint(JointType::WristRight, Vector3::new(0.3 + bend, -0.5, 2.0 - bend))
        .with_joint(JointType::HipRight, Vector3::new(0.15, -0.5, 2.0))
        .with_joint(JointType::ShoulderLeft, Vector3::new(-0.2, 0.0, 2.0))
        .with_joint(JointType::ElbowLeft, Vector3::new(-0.3, -0.25, 2.0))
        .with_joint(JointType::WristLeft, Vector3::new(-0.3, -0.5, 2.0))
        .with_joint(JointType::HipLeft, Vector3::new(-0.15, -0.5, 2.0))
        .with_hands(HandState::Open, HandState::Open)
}

/// 0, 150, 300 ms に3フレームを記録する
async fn record_three_ticks() -> MotionSequence {
    let source = ScriptedSource::new(vec![
        Some(pose_with_bend(0.0)),
        Some(pose_with_bend(0.1)),
        Some(pose_with_bend(0.2)),
    ]);
    let mut control = ControlLoop::new(&config_without_invert(), source, CaptureActuator::new());
    control.start_recording();
    control.tick();
    advance(Duration::from_millis(150)).await;
    control.tick();
    advance(Duration::from_millis(150)).await;
    control.tick();
    control.stop_recording()
}

#[test]
fn test_straight_right_arm_elbow_roll() {
    let pose = Pose::default()
        .with_joint(JointType::ShoulderRight, Vector3::new(0.0, 0.0, 0.0))
        .with_joint(JointType::ElbowRight, Vector3::new(0.0, -1.0, 0.0))
        .with_joint(JointType::WristRight, Vector3::new(0.0, -2.0, 0.0))
        .with_joint(JointType::HipRight, Vector3::new(0.0, 1.0, 0.0));

    let raw = PoseExtractor::new().extract(Some(&pose));
    // 肩-肘-手首が一直線なので内角は π
    assert!(approx_eq(raw.angles.get(Role::RightElbowRoll), -PI));

    let config = CalibrationConfig::default();
    let calibrated = Calibrator::from_config(&config).apply(&raw);
    assert!(approx_eq(
        calibrated.angles.get(Role::RightElbowRoll),
        -PI - config.offsets[Role::RightElbowRoll.index()]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_record_three_ticks_in_order() {
    let sequence = record_three_ticks().await;
    assert_eq!(sequence.len(), 3);
    let times: Vec<u64> = sequence.iter().map(|r| r.elapsed_ms).collect();
    assert_eq!(times, vec![0, 150, 300]);

    let bends: Vec<f32> = sequence.iter().map(|r| r.frame.angles.get(Role::RightElbowRoll)).collect();
    assert!(bends[0] != bends[1] && bends[1] != bends[2]);
}

#[tokio::test(start_paused = true)]
async fn test_playback_never_dispatches_early() {
    let sequence = record_three_ticks().await;
    let config = config_without_invert();
    let calibrator = Calibrator::from_config(&config.calibration);
    let expected: Vec<(u64, f32)> = sequence
        .iter()
        .map(|r| (r.elapsed_ms, calibrator.apply(&r.frame).angles.get(Role::RightElbowRoll)))
        .collect();

    let capture = CaptureActuator::new();
    let mut control = ControlLoop::new(&config, ScriptedSource::new(vec![]), capture.clone());
    control.connect().unwrap();
    capture.clear();

    let start = Instant::now();
    let outcome = control.play(sequence, &CancellationToken::new()).await;
    assert_eq!(outcome, PlaybackOutcome::Completed { played: 3 });

    let elbow: Vec<(Instant, f32)> = capture
        .timed_commands()
        .into_iter()
        .filter_map(|(at, c)| match c {
            ActuatorCommand::Angle { joint: JointId::RElbowRoll, angle, .. } => Some((at, angle)),
            _ => None,
        })
        .collect();
    assert_eq!(elbow.len(), 3);
    for ((at, angle), (scheduled, calibrated)) in elbow.iter().zip(&expected) {
        assert!(at.duration_since(start) >= Duration::from_millis(*scheduled));
        assert!(approx_eq(*angle, *calibrated));
    }
    assert!(elbow.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[tokio::test(start_paused = true)]
async fn test_playback_while_disconnected_sends_nothing() {
    let sequence = record_three_ticks().await;
    let capture = CaptureActuator::new();
    let mut control = ControlLoop::new(&config_without_invert(), ScriptedSource::new(vec![]), capture.clone());
    let outcome = control.play(sequence, &CancellationToken::new()).await;
    assert_eq!(outcome.played(), 3);
    assert!(capture.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_spawned_loop_records_and_replays() {
    let poses: Vec<Option<Pose>> = (0..10).map(|i| Some(pose_with_bend(i as f32 * 0.02))).collect();
    let capture = CaptureActuator::new();
    let control = ControlLoop::new(&config_without_invert(), ScriptedSource::new(poses), capture.clone());
    let (handle, task) = control.spawn();

    handle.connect().await.unwrap();
    handle.start_recording().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let sequence = handle.stop_recording().await.unwrap();
    assert!(sequence.len() >= 3);
    assert!(sequence.iter().all(|r| r.frame.is_tracked()));

    let played = sequence.len();
    let outcome = handle.play(sequence).await.unwrap();
    assert_eq!(outcome, PlaybackOutcome::Completed { played });
    assert!(!handle.status().playing);

    handle.shutdown();
    task.await.unwrap();
    let releases = capture
        .commands()
        .into_iter()
        .filter(|c| matches!(c, ActuatorCommand::Stiffness { stiffness, .. } if *stiffness == 0.0))
        .count();
    assert_eq!(releases, 3);
}

#[tokio::test(start_paused = true)]
async fn test_second_playback_refused_and_first_stoppable() {
    let mut long = MotionSequence::new();
    let frame = PoseExtractor::new().extract(Some(&pose_with_bend(0.0)));
    for i in 0..10 {
        long.push(i * 1000, frame);
    }

    let control = ControlLoop::new(&Config::default(), ScriptedSource::new(vec![]), CaptureActuator::new());
    let (handle, task) = control.spawn();

    let first = tokio::spawn({
        let handle = handle.clone();
        async move { handle.play(long).await }
    });
    let mut status = handle.watch_status();
    status.wait_for(|s| s.playing).await.unwrap();

    let mut short = MotionSequence::new();
    short.push(0, frame);
    assert!(handle.play(short).await.is_err());

    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.stop_playback().await.unwrap();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome, PlaybackOutcome::Cancelled { played: 3 });

    handle.shutdown();
    task.await.unwrap();
}
