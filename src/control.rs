use anyhow::{anyhow, Context, Result};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::actuator::{self, Actuator};
use crate::config::{ActuatorConfig, CalibrationConfig, Config};
use crate::frame::ControlFrame;
use crate::motion::{self, MotionRecord, MotionSequence, PlaybackOutcome, Player, Recorder};
use crate::pose::PoseSource;
use crate::tracker::{Calibrator, GateReport, PoseExtractor, UpdateGate};

/// 表示用の最新状態
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    /// 最後に補正したフレーム
    pub frame: ControlFrame,
    pub connected: bool,
    pub recording: bool,
    pub playing: bool,
    pub invert: bool,
    /// 記録中のレコード数
    pub recorded: usize,
}

/// 1ティックの処理結果
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// 補正済みフレーム
    pub frame: ControlFrame,
    pub recorded: bool,
    /// 送信しなかったティックでは None
    pub gate: Option<GateReport>,
}

/// 制御ループへの命令。ティックの合間に1つずつ処理される
pub enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect,
    SetInvert(bool),
    SetCalibration(CalibrationConfig, oneshot::Sender<Result<()>>),
    StartRecording,
    StopRecording(oneshot::Sender<MotionSequence>),
    DiscardRecording,
    Play {
        sequence: MotionSequence,
        done: oneshot::Sender<Result<PlaybackOutcome>>,
    },
    StopPlayback,
}

struct ActivePlayback {
    player: Player,
    done: oneshot::Sender<Result<PlaybackOutcome>>,
}

/// 抽出 → 補正 → （記録）→ ゲート → 送信 を一定周期で回すループ
///
/// 可変状態はすべてこの構造体が持ち、ティックと命令処理は同じタスクで直列に実行する。
pub struct ControlLoop<S, A> {
    source: S,
    actuator: A,
    actuator_config: ActuatorConfig,
    period: Duration,
    extractor: PoseExtractor,
    calibrator: Calibrator,
    gate: UpdateGate,
    recorder: Recorder,
    connected: bool,
    engaged: bool,
    playing: bool,
    body_tracked: bool,
    last_frame: ControlFrame,
    status_tx: watch::Sender<Status>,
}

impl<S: PoseSource, A: Actuator> ControlLoop<S, A> {
    pub fn new(config: &Config, source: S, actuator: A) -> Self {
        let calibrator = Calibrator::from_config(&config.calibration);
        let (status_tx, _) = watch::channel(Status {
            invert: calibrator.invert(),
            ..Status::default()
        });
        Self {
            source,
            actuator,
            actuator_config: config.actuator.clone(),
            period: Duration::from_millis(config.control.period_ms),
            extractor: PoseExtractor::new(),
            calibrator,
            gate: UpdateGate::from_config(&config.control, config.actuator.speed),
            recorder: Recorder::new(),
            connected: false,
            engaged: false,
            playing: false,
            body_tracked: false,
            last_frame: ControlFrame::default(),
            status_tx,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn status(&self) -> Status {
        Status {
            frame: self.last_frame,
            connected: self.connected,
            recording: self.recorder.is_recording(),
            playing: self.playing,
            invert: self.calibrator.invert(),
            recorded: self.recorder.len(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// 1周期分の処理
    ///
    /// ボディが無いティックや再生中のティックでは何も送らない。
    /// 記録するのは補正前のフレーム。
    pub fn tick(&mut self) -> TickReport {
        let pose = self.source.poll();
        let raw = self.extractor.extract(pose.as_ref());

        if raw.is_tracked() != self.body_tracked {
            self.body_tracked = raw.is_tracked();
            info!("body {}", if self.body_tracked { "tracked" } else { "lost" });
        }

        let recorded = !self.playing && self.recorder.capture(&raw);
        let frame = self.calibrator.apply(&raw);

        let gate = if self.connected && !self.playing && frame.is_tracked() {
            Some(self.gate.dispatch(&frame, self.calibrator.invert(), &mut self.actuator))
        } else {
            None
        };

        // 再生中の状態には再生中のフレームを出す
        if !self.playing {
            self.last_frame = frame;
            self.publish();
        }
        TickReport { frame, recorded, gate }
    }

    /// 記録済みフレームを補正し直してライブと同じ経路で送る
    fn dispatch_record(&mut self, record: &MotionRecord) -> Option<GateReport> {
        let frame = self.calibrator.apply(&record.frame);
        self.last_frame = frame;
        let report = if self.connected {
            Some(self.gate.dispatch(&frame, self.calibrator.invert(), &mut self.actuator))
        } else {
            None
        };
        self.publish();
        report
    }

    fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        self.publish();
    }

    /// 再生が終わるまでこのループを占有して再生する
    pub async fn play(&mut self, sequence: MotionSequence, cancel: &CancellationToken) -> PlaybackOutcome {
        self.set_playing(true);
        let outcome = motion::play(sequence, cancel, |record| {
            self.dispatch_record(record);
        })
        .await;
        self.set_playing(false);
        outcome
    }

    /// ロボットの腕にスティフネスをかけて送信を有効にする
    pub fn connect(&mut self) -> Result<()> {
        actuator::engage(&mut self.actuator, &self.actuator_config)
            .context("Failed to set stiffness")?;
        self.engaged = true;
        self.connected = true;
        info!("connected");
        self.publish();
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
        info!("disconnected");
        self.publish();
    }

    pub fn set_invert(&mut self, invert: bool) {
        let config = self.calibrator.config().with_invert(invert);
        self.calibrator.set_config(Arc::new(config));
        info!("invert: {}", invert);
        self.publish();
    }

    pub fn set_calibration(&mut self, config: CalibrationConfig) -> Result<()> {
        config.validate()?;
        self.calibrator.set_config(Arc::new(config));
        self.publish();
        Ok(())
    }

    pub fn start_recording(&mut self) {
        self.recorder.start();
        self.publish();
    }

    pub fn stop_recording(&mut self) -> MotionSequence {
        let sequence = self.recorder.stop();
        self.publish();
        sequence
    }

    pub fn discard_recording(&mut self) {
        self.recorder.discard();
        self.publish();
    }

    /// 送信を止め、スティフネスを抜く
    pub fn shutdown(&mut self) {
        self.connected = false;
        if self.engaged {
            if let Err(e) = actuator::release(&mut self.actuator) {
                warn!("Failed to release stiffness: {:#}", e);
            }
            self.engaged = false;
        }
        self.publish();
    }

    fn handle(&mut self, command: Command, playback: &mut Option<ActivePlayback>) {
        match command {
            Command::Connect(reply) => {
                let _ = reply.send(self.connect());
            }
            Command::Disconnect => self.disconnect(),
            Command::SetInvert(invert) => self.set_invert(invert),
            Command::SetCalibration(config, reply) => {
                let _ = reply.send(self.set_calibration(config));
            }
            Command::StartRecording => self.start_recording(),
            Command::StopRecording(reply) => {
                let _ = reply.send(self.stop_recording());
            }
            Command::DiscardRecording => self.discard_recording(),
            Command::Play { sequence, done } => {
                if playback.is_some() {
                    let _ = done.send(Err(anyhow!("playback already in progress")));
                    return;
                }
                let player = Player::new(sequence);
                if player.is_finished() {
                    let _ = done.send(Ok(PlaybackOutcome::Completed { played: 0 }));
                    return;
                }
                self.set_playing(true);
                *playback = Some(ActivePlayback { player, done });
            }
            Command::StopPlayback => {
                if let Some(active) = playback.take() {
                    self.finish_playback(active);
                }
            }
        }
    }

    fn finish_playback(&mut self, active: ActivePlayback) {
        let played = active.player.played();
        let outcome = if active.player.is_finished() {
            info!("playback finished");
            PlaybackOutcome::Completed { played }
        } else {
            info!("playback cancelled after {} records", played);
            PlaybackOutcome::Cancelled { played }
        };
        self.set_playing(false);
        let _ = active.done.send(Ok(outcome));
    }

    /// `shutdown` がキャンセルされるか命令チャネルが閉じるまで回す
    ///
    /// 再生中もティックは続くが、送信と記録は再生側だけが行う。
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut playback: Option<ActivePlayback> = None;
        info!("control loop started ({} ms period)", self.period.as_millis());

        loop {
            let deadline = playback.as_ref().and_then(|p| p.player.next_deadline());
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command, &mut playback),
                    None => break,
                },
                _ = wait_until(deadline) => {
                    if let Some(active) = playback.as_mut() {
                        if let Some(record) = active.player.take_due() {
                            self.dispatch_record(&record);
                        }
                        if active.player.is_finished() {
                            if let Some(active) = playback.take() {
                                self.finish_playback(active);
                            }
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        if let Some(active) = playback.take() {
            self.finish_playback(active);
        }
        self.shutdown();
        info!("control loop stopped");
    }
}

impl<S, A> ControlLoop<S, A>
where
    S: PoseSource + Send + 'static,
    A: Actuator + 'static,
{
    /// ループをタスクとして起動し、操作用ハンドルを返す
    pub fn spawn(self) -> (ControlHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let handle = ControlHandle {
            commands: tx,
            status: self.subscribe(),
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(self.run(rx, shutdown));
        (handle, task)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// 起動中の制御ループへの操作ハンドル
#[derive(Clone)]
pub struct ControlHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<Status>,
    shutdown: CancellationToken,
}

impl ControlHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("control loop is not running"))
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.context("control loop dropped the request")
    }

    pub async fn connect(&self) -> Result<()> {
        self.request(Command::Connect).await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    pub async fn set_invert(&self, invert: bool) -> Result<()> {
        self.send(Command::SetInvert(invert)).await
    }

    pub async fn set_calibration(&self, config: CalibrationConfig) -> Result<()> {
        self.request(|tx| Command::SetCalibration(config, tx)).await?
    }

    pub async fn start_recording(&self) -> Result<()> {
        self.send(Command::StartRecording).await
    }

    pub async fn stop_recording(&self) -> Result<MotionSequence> {
        self.request(Command::StopRecording).await
    }

    pub async fn discard_recording(&self) -> Result<()> {
        self.send(Command::DiscardRecording).await
    }

    /// 再生を開始し、終わるまで待つ
    pub async fn play(&self, sequence: MotionSequence) -> Result<PlaybackOutcome> {
        self.request(|done| Command::Play { sequence, done }).await?
    }

    pub async fn stop_playback(&self) -> Result<()> {
        self.send(Command::StopPlayback).await
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ActuatorCommand, CaptureActuator, Chain};
    use crate::geometry::Vector3;
    use crate::pose::{HandState, JointType, Pose, ScriptedSource};

    fn arm_pose(elbow_y: f32) -> Pose {
        Pose::default()
            .with_joint(JointType::ShoulderRight, Vector3::new(0.2, 0.0, 2.0))
            .with_joint(JointType::ElbowRight, Vector3::new(0.3, elbow_y, 2.0))
            .with_joint(JointType::WristRight, Vector3::new(0.4, elbow_y - 0.2, 1.9))
            .with_joint(JointType::HipRight, Vector3::new(0.15, -0.5, 2.0))
            .with_joint(JointType::ShoulderLeft, Vector3::new(-0.2, 0.0, 2.0))
            .with_joint(JointType::ElbowLeft, Vector3::new(-0.3, -0.2, 2.0))
            .with_joint(JointType::WristLeft, Vector3::new(-0.35, -0.4, 2.0))
            .with_joint(JointType::HipLeft, Vector3::new(-0.15, -0.5, 2.0))
            .with_hands(HandState::Open, HandState::Closed)
    }

    fn control_loop(poses: Vec<Option<Pose>>) -> (ControlLoop<ScriptedSource, CaptureActuator>, CaptureActuator) {
        let capture = CaptureActuator::new();
        let cl = ControlLoop::new(&Config::default(), ScriptedSource::new(poses), capture.clone());
        (cl, capture)
    }

    fn angle_commands(capture: &CaptureActuator) -> usize {
        capture
            .commands()
            .iter()
            .filter(|c| matches!(c, ActuatorCommand::Angle { .. }))
            .count()
    }

    #[test]
    fn test_nothing_sent_while_disconnected() {
        let (mut cl, capture) = control_loop(vec![Some(arm_pose(-0.2))]);
        let report = cl.tick();
        assert!(report.gate.is_none());
        assert!(capture.commands().is_empty());
        assert!(report.frame.is_tracked());
    }

    #[test]
    fn test_connect_stiffens_then_dispatches() {
        let (mut cl, capture) = control_loop(vec![Some(arm_pose(-0.2)), None]);
        cl.connect().unwrap();
        let commands = capture.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], ActuatorCommand::Stiffness { chain: Chain::Head, stiffness: 1.0 });

        let report = cl.tick();
        let gate = report.gate.unwrap();
        assert_eq!(gate.joints.len(), 6);
        assert_eq!(gate.hands.len(), 2);

        // ボディ無しのティックでは送らない
        let report = cl.tick();
        assert!(report.frame.no_tracked_body);
        assert!(report.gate.is_none());
        assert_eq!(angle_commands(&capture), 6);
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let (mut cl, capture) = control_loop(vec![Some(arm_pose(-0.2))]);
        capture.set_failing(true);
        assert!(cl.connect().is_err());
        assert!(!cl.status().connected);
        capture.set_failing(false);
        assert!(cl.tick().gate.is_none());
    }

    #[test]
    fn test_dispatch_failure_does_not_stop_loop() {
        let (mut cl, capture) = control_loop(vec![Some(arm_pose(-0.2)), Some(arm_pose(-0.3))]);
        cl.connect().unwrap();
        capture.set_failing(true);
        let report = cl.tick();
        assert_eq!(report.gate.unwrap().failures(), 8);
        capture.set_failing(false);
        let report = cl.tick();
        assert_eq!(report.gate.unwrap().failures(), 0);
    }

    #[test]
    fn test_status_reflects_session() {
        let (mut cl, _capture) = control_loop(vec![]);
        let rx = cl.subscribe();
        assert!(rx.borrow().invert);
        cl.set_invert(false);
        assert!(!rx.borrow().invert);
        cl.connect().unwrap();
        assert!(rx.borrow().connected);
        cl.disconnect();
        assert!(!rx.borrow().connected);
    }

    #[test]
    fn test_invalid_calibration_rejected() {
        let (mut cl, _capture) = control_loop(vec![]);
        let bad = CalibrationConfig {
            pitch_min: 1.0,
            pitch_max: 0.0,
            ..CalibrationConfig::default()
        };
        assert!(cl.set_calibration(bad).is_err());
        assert_eq!(cl.calibrator.config().pitch_min, -2.0);
    }

    #[test]
    fn test_shutdown_releases_stiffness_once() {
        let (mut cl, capture) = control_loop(vec![]);
        cl.shutdown();
        assert!(capture.commands().is_empty());
        cl.connect().unwrap();
        cl.shutdown();
        cl.shutdown();
        let releases = capture
            .commands()
            .into_iter()
            .filter(|c| matches!(c, ActuatorCommand::Stiffness { stiffness, .. } if *stiffness == 0.0))
            .count();
        assert_eq!(releases, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_stores_uncalibrated_tracked_frames() {
        let (mut cl, _capture) = control_loop(vec![Some(arm_pose(-0.2)), None, Some(arm_pose(-0.4))]);
        cl.start_recording();
        let first = cl.tick();
        tokio::time::advance(Duration::from_millis(143)).await;
        cl.tick();
        tokio::time::advance(Duration::from_millis(143)).await;
        cl.tick();
        let seq = cl.stop_recording();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.records()[0].elapsed_ms, 0);
        assert_eq!(seq.records()[1].elapsed_ms, 286);
        // 記録はオフセット適用前
        assert_ne!(seq.records()[0].frame.angles, first.frame.angles);
        let recalibrated = cl.calibrator.apply(&seq.records()[0].frame);
        assert_eq!(recalibrated.angles, first.frame.angles);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_dispatches_recalibrated_frames() {
        let (mut cl, capture) = control_loop(vec![]);
        cl.connect().unwrap();
        capture.clear();

        let mut seq = MotionSequence::new();
        let raw = PoseExtractor::new().extract(Some(&arm_pose(-0.2)));
        seq.push(0, raw);
        seq.push(100, raw);
        let outcome = cl.play(seq, &CancellationToken::new()).await;
        assert_eq!(outcome, PlaybackOutcome::Completed { played: 2 });
        assert_eq!(angle_commands(&capture), 12);
        assert!(!cl.status().playing);
        assert_eq!(cl.status().frame, cl.calibrator.apply(&raw));
    }

    #[test]
    fn test_live_tick_keeps_replayed_frame_while_playing() {
        let (mut cl, capture) = control_loop(vec![Some(arm_pose(-0.4))]);
        cl.connect().unwrap();
        capture.clear();
        let rx = cl.subscribe();

        let raw = PoseExtractor::new().extract(Some(&arm_pose(-0.2)));
        cl.set_playing(true);
        cl.dispatch_record(&MotionRecord { elapsed_ms: 0, frame: raw });
        let replayed = cl.calibrator.apply(&raw);

        let report = cl.tick();
        assert!(report.gate.is_none());
        assert_ne!(report.frame, replayed);
        assert_eq!(cl.status().frame, replayed);
        assert_eq!(rx.borrow().frame, replayed);
        assert_eq!(angle_commands(&capture), 6);
    }
}
