use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use nao_mirror::actuator::{Actuator, OscActuator};
use nao_mirror::config::Config;
use nao_mirror::control::{ControlHandle, ControlLoop};
use nao_mirror::frame::Role;
use nao_mirror::logging;
use nao_mirror::motion::{self, file::FILE_EXTENSION};
use nao_mirror::pose::{NoSensor, PoseFile, PoseSource};

const CONFIG_PATH: &str = "config.toml";

fn open_sensor(config: &Config) -> Result<Box<dyn PoseSource + Send>> {
    match &config.sensor.pose_file {
        Some(path) => {
            let file = PoseFile::load(path, config.sensor.repeat)?;
            info!("pose capture: {} ({} frames)", path, file.len());
            Ok(Box::new(file))
        }
        None => {
            warn!("no pose source configured, body will never be tracked");
            Ok(Box::new(NoSensor))
        }
    }
}

/// 保存先。名前が無ければ日時から作る
fn recording_path(dir: &str, name: Option<&str>) -> PathBuf {
    let dir = Path::new(dir);
    match name {
        Some(name) if Path::new(name).extension().is_some() => dir.join(name),
        Some(name) => dir.join(format!("{}.{}", name, FILE_EXTENSION)),
        None => {
            let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("motion_{}.{}", ts, FILE_EXTENSION))
        }
    }
}

fn resolve_motion_path(dir: &str, name: &str) -> PathBuf {
    let direct = PathBuf::from(name);
    if direct.exists() {
        direct
    } else {
        recording_path(dir, Some(name))
    }
}

fn print_help() {
    println!("コマンド:");
    println!("  c             - 接続 (スティフネスON)");
    println!("  d             - 切断");
    println!("  i on|off      - 左右反転");
    println!("  r             - 記録開始");
    println!("  s [name]      - 記録停止して保存");
    println!("  x             - 記録を破棄");
    println!("  p name        - 再生");
    println!("  k             - 再生停止");
    println!("  st            - 状態表示");
    println!("  q             - 終了");
}

fn print_status(handle: &ControlHandle) {
    let status = handle.status();
    println!(
        "接続: {}  反転: {}  記録: {} ({}件)  再生: {}  ボディ: {}",
        status.connected,
        status.invert,
        status.recording,
        status.recorded,
        status.playing,
        if status.frame.is_tracked() { "あり" } else { "なし" },
    );
    for role in Role::ALL {
        println!("  {:?}: {:.3}", role, status.frame.angles.get(role));
    }
}

async fn stop_and_save(handle: &ControlHandle, dir: &str, name: Option<&str>) -> Result<()> {
    let sequence = handle.stop_recording().await?;
    if sequence.is_empty() {
        println!("記録が空なので保存しません");
        return Ok(());
    }
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir))?;
    let path = recording_path(dir, name);
    motion::save(&sequence, &path)?;
    println!("保存しました: {} ({}件, {}ms)", path.display(), sequence.len(), sequence.duration_ms());
    Ok(())
}

fn start_playback(handle: &ControlHandle, dir: &str, name: &str) -> Result<()> {
    let path = resolve_motion_path(dir, name);
    let sequence = motion::load(&path)?;
    println!("再生: {} ({}件, {}ms)", path.display(), sequence.len(), sequence.duration_ms());
    let handle = handle.clone();
    tokio::spawn(async move {
        match handle.play(sequence).await {
            Ok(outcome) => info!("playback: {:?}", outcome),
            Err(e) => error!("playback failed: {:#}", e),
        }
    });
    Ok(())
}

async fn run_command(handle: &ControlHandle, config: &Config, parts: &[&str]) -> Result<bool> {
    let dir = config.recording.dir.as_str();
    match parts {
        ["c"] => {
            handle.connect().await?;
            println!("接続しました: {}", config.actuator.addr);
        }
        ["d"] => handle.disconnect().await?,
        ["i", "on"] => handle.set_invert(true).await?,
        ["i", "off"] => handle.set_invert(false).await?,
        ["r"] => {
            handle.start_recording().await?;
            println!("記録中...");
        }
        ["s"] => stop_and_save(handle, dir, None).await?,
        ["s", name] => stop_and_save(handle, dir, Some(*name)).await?,
        ["x"] => handle.discard_recording().await?,
        ["p", name] => start_playback(handle, dir, name)?,
        ["k"] => handle.stop_playback().await?,
        ["st"] => print_status(handle),
        ["h"] => print_help(),
        ["q"] => return Ok(false),
        _ => println!("不明なコマンド: {}", parts.join(" ")),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH)?;
    let log_path = logging::init(&config.log)?;
    if Path::new(CONFIG_PATH).exists() {
        info!("config: {}", CONFIG_PATH);
    } else {
        warn!("{} not found, using defaults", CONFIG_PATH);
    }

    println!("=== NAO Mirror ({}) ===", env!("GIT_VERSION"));
    println!("送信先: {}", config.actuator.addr);
    println!("周期: {}ms", config.control.period_ms);
    println!("ログ: {}", log_path.display());
    println!();
    print_help();
    println!();

    let source = open_sensor(&config)?;
    let actuator: Box<dyn Actuator> = Box::new(OscActuator::new(&config.actuator.addr)?);
    let (handle, task) = ControlLoop::new(&config, source, actuator).spawn();

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match run_command(&handle, &config, &parts).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("エラー: {:#}", e),
        }
    }

    println!("終了します");
    handle.shutdown();
    task.await.context("control loop panicked")?;
    Ok(())
}
