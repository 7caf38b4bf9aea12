//! モーション列の保存と読み込み
//!
//! バイナリ形式 (`.nmv`): 4バイトのマジック `NMV\0`、リトルエンディアン u16 の
//! フォーマットバージョン、続いてレコード列の bincode エンコード
//! （u64 の件数のあとに各レコードの経過時間・f32 角度6個・フラグ3個）。
//! 拡張子が `.json` のときは serde_json のテキスト形式で保存する。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::sequence::{MotionRecord, MotionSequence};

pub const MAGIC: [u8; 4] = *b"NMV\0";
pub const FORMAT_VERSION: u16 = 1;
pub const FILE_EXTENSION: &str = "nmv";

const HEADER_LEN: usize = MAGIC.len() + 2;

#[derive(Debug, Error)]
pub enum MotionFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode motion sequence: {0}")]
    Encode(String),

    #[error("failed to decode motion sequence: {0}")]
    Decode(String),

    #[error("not a motion file (bad magic)")]
    BadMagic,

    #[error("unsupported motion file version {0}")]
    UnsupportedVersion(u16),

    #[error("record {index} is earlier than the record before it")]
    OutOfOrder { index: usize },

    #[error("motion sequence is empty")]
    Empty,
}

impl MotionFileError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MotionFileError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, MotionFileError>;

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// バイナリ形式にエンコードする
pub fn to_bytes(sequence: &MotionSequence) -> Result<Vec<u8>> {
    if sequence.is_empty() {
        return Err(MotionFileError::Empty);
    }
    let body = bincode::serialize(sequence.records())
        .map_err(|e| MotionFileError::Encode(e.to_string()))?;
    let mut data = Vec::with_capacity(HEADER_LEN + body.len());
    data.extend_from_slice(&MAGIC);
    data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    data.extend_from_slice(&body);
    Ok(data)
}

/// バイナリ形式からデコードする
pub fn from_bytes(data: &[u8]) -> Result<MotionSequence> {
    if data.len() < HEADER_LEN || data[..MAGIC.len()] != MAGIC {
        return Err(MotionFileError::BadMagic);
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != FORMAT_VERSION {
        return Err(MotionFileError::UnsupportedVersion(version));
    }
    let records: Vec<MotionRecord> = bincode::deserialize(&data[HEADER_LEN..])
        .map_err(|e| MotionFileError::Decode(e.to_string()))?;
    into_sequence(records)
}

fn into_sequence(records: Vec<MotionRecord>) -> Result<MotionSequence> {
    if records.is_empty() {
        return Err(MotionFileError::Empty);
    }
    MotionSequence::from_records(records).map_err(|index| MotionFileError::OutOfOrder { index })
}

pub fn save<P: AsRef<Path>>(sequence: &MotionSequence, path: P) -> Result<()> {
    let path = path.as_ref();
    let data = if is_json(path) {
        if sequence.is_empty() {
            return Err(MotionFileError::Empty);
        }
        serde_json::to_vec_pretty(sequence).map_err(|e| MotionFileError::Encode(e.to_string()))?
    } else {
        to_bytes(sequence)?
    };
    fs::write(path, data).map_err(|source| MotionFileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<MotionSequence> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| MotionFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if is_json(path) {
        let sequence: MotionSequence =
            serde_json::from_slice(&data).map_err(|e| MotionFileError::Decode(e.to_string()))?;
        into_sequence(sequence.records().to_vec())
    } else {
        from_bytes(&data)
    }
}
