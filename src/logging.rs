use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// `logs/nao_mirror_YYYYMMDD_HHMMSS.log` 形式のパスを作る
pub fn log_file_path(dir: &Path) -> PathBuf {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("nao_mirror_{}.log", ts))
}

/// RUST_LOG があればそれを、無ければ設定のレベルを使う
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// 標準エラーとログファイルの両方に出力するサブスクライバを登録する
///
/// 作成したログファイルのパスを返す。
pub fn init(config: &LogConfig) -> Result<PathBuf> {
    let dir = Path::new(&config.dir);
    fs::create_dir_all(dir).with_context(|| format!("Failed to create log dir: {}", dir.display()))?;
    let path = log_file_path(dir);
    let file = File::create(&path).with_context(|| format!("Failed to create log file: {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(path)
}
