//! 批处理进度的持久化.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use super::VolumeMeasurement;

/// 检查点状态: 已尝试过的扫描名集合, 加上至今累积的全部测量行.
///
/// 该状态由批处理运行上下文独占; 批处理完成并写出最终表格后,
/// 检查点即被最终表格取代, 不再是独立的事实来源.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointState {
    processed: HashSet<String>,
    rows: Vec<VolumeMeasurement>,
}

/// 检查点读写错误.
///
/// 无法持久化进度的批处理不应继续运行, 因此该错误是致命的,
/// 会原样上抛给调用方.
#[derive(Debug)]
pub enum CheckpointError {
    /// 底层 I/O 错误.
    IoError(std::io::Error),

    /// 序列化/反序列化错误 (通常意味着检查点文件损坏).
    CodecError(bincode::Error),
}

impl CheckpointState {
    /// 该扫描是否已被尝试过?
    #[inline]
    pub fn is_processed(&self, scan_name: &str) -> bool {
        self.processed.contains(scan_name)
    }

    /// 追加一行测量结果, 并将其扫描名标记为已尝试.
    pub fn push(&mut self, row: VolumeMeasurement) {
        self.processed.insert(row.scan_name.clone());
        self.rows.push(row);
    }

    /// 至今累积的测量行, 按处理顺序排列.
    #[inline]
    pub fn rows(&self) -> &[VolumeMeasurement] {
        &self.rows
    }

    /// 取得全部测量行的所有权.
    #[inline]
    pub fn into_rows(self) -> Vec<VolumeMeasurement> {
        self.rows
    }

    /// 已尝试过的扫描个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否尚无任何进度.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 从 `path` 加载检查点. 文件不存在时返回全新的空状态.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path).map_err(CheckpointError::IoError)?;
        bincode::deserialize_from(GzDecoder::new(BufReader::new(file)))
            .map_err(CheckpointError::CodecError)
    }

    /// 将状态写入 `path`.
    ///
    /// 先写临时文件再重命名, 因此 `path` 处的文件在任何时刻
    /// 都是一个完整一致的快照.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");

        let file = File::create(&tmp).map_err(CheckpointError::IoError)?;
        let mut enc = GzEncoder::new(BufWriter::new(file), Compression::default());
        bincode::serialize_into(&mut enc, self).map_err(CheckpointError::CodecError)?;
        let mut inner = enc.finish().map_err(CheckpointError::IoError)?;
        inner.flush().map_err(CheckpointError::IoError)?;

        fs::rename(&tmp, path).map_err(CheckpointError::IoError)
    }
}
