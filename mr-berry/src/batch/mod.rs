//! 带检查点的批处理循环.
//!
//! 运行进度由 [`BatchRunner`] 作为显式运行上下文独占持有,
//! 不存在模块级可变状态. 扫描严格按清单顺序逐个处理,
//! 单个扫描的任何失败都被折叠为 `status = failed` 的一行,
//! 永远不会中止整个批处理; 只有检查点读写失败是致命的.

mod checkpoint;

pub use checkpoint::{CheckpointError, CheckpointState};

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_CHECKPOINT_INTERVAL;
use crate::dataset::ScanRecord;
use crate::segment::{SegmentationError, Segmenter};
use crate::volume::{self, HippoVolume, InvalidMaskError};
use crate::{MrLabel, MrScan, NiftiHeaderAttr, SpacingMm};

/// 单个扫描的终态.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// 完整的测量行已产出.
    Success,

    /// 读取/分割/校验任一环节失败, 体积列为空.
    Failed,
}

impl ScanStatus {
    /// 是否成功.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// 一次扫描尝试的结果行. 创建后不再修改.
///
/// 不变式: `status` 为成功时, 三个体积列均存在且
/// `total_cm3 == left_cm3 + right_cm3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMeasurement {
    /// 规范扫描名 (唯一键).
    pub scan_name: String,

    /// 患者编号.
    pub patient_id: String,

    /// 就诊/会话编号.
    pub session: u32,

    /// 终态.
    pub status: ScanStatus,

    /// 左侧海马体体积 (cm³).
    pub left_cm3: Option<f64>,

    /// 右侧海马体体积 (cm³).
    pub right_cm3: Option<f64>,

    /// 总体积 (cm³).
    pub total_cm3: Option<f64>,

    /// 体素分辨率 (mm). 失败行在 header 可读时仍会记录.
    #[serde(with = "voxel_size_fmt")]
    pub voxel_size_mm: Option<SpacingMm>,
}

impl VolumeMeasurement {
    /// 构造成功行.
    pub fn success(record: &ScanRecord, vol: HippoVolume, spacing: SpacingMm) -> Self {
        Self {
            scan_name: record.scan_name.clone(),
            patient_id: record.patient_id.clone(),
            session: record.session,
            status: ScanStatus::Success,
            left_cm3: Some(vol.left_cm3),
            right_cm3: Some(vol.right_cm3),
            total_cm3: Some(vol.total_cm3),
            voxel_size_mm: Some(spacing),
        }
    }

    /// 构造失败行.
    pub fn failed(record: &ScanRecord, spacing: Option<SpacingMm>) -> Self {
        Self {
            scan_name: record.scan_name.clone(),
            patient_id: record.patient_id.clone(),
            session: record.session,
            status: ScanStatus::Failed,
            left_cm3: None,
            right_cm3: None,
            total_cm3: None,
            voxel_size_mm: spacing,
        }
    }
}

/// `voxel_size_mm` 列的文本表示: `{z}x{h}x{w}`, 缺失时为空.
pub(crate) mod voxel_size_fmt {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<[f64; 3]>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some([a, b, c]) => s.serialize_some(&format!("{a}x{b}x{c}")),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[f64; 3]>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let mut it = raw.split('x').map(str::parse::<f64>);
        match (it.next(), it.next(), it.next(), it.next()) {
            (Some(Ok(a)), Some(Ok(b)), Some(Ok(c)), None) => Ok(Some([a, b, c])),
            _ => Err(D::Error::custom(format!("无法解析体素分辨率 `{raw}`"))),
        }
    }
}

/// 成功扫描的中间产物 (外部协作方产出) 的落盘目录.
#[derive(Debug, Clone)]
pub struct ArtifactDirs {
    /// 颅骨剥离体积 `{scan_name}_brain.nii.gz` 的输出目录.
    pub brain_dir: PathBuf,

    /// 海马体标注 `{scan_name}_hippo.nii.gz` 的输出目录.
    pub hippo_dir: PathBuf,
}

/// 批处理配置.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    checkpoint_path: PathBuf,
    checkpoint_interval: NonZeroUsize,
    artifacts: Option<ArtifactDirs>,
}

impl BatchConfig {
    /// 以默认检查点间隔初始化配置.
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            // 该常量非零, 可直接 unwrap.
            checkpoint_interval: NonZeroUsize::new(DEFAULT_CHECKPOINT_INTERVAL).unwrap(),
            artifacts: None,
        }
    }

    /// 覆盖检查点间隔 (以扫描个数计).
    pub fn with_interval(mut self, interval: NonZeroUsize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// 启用中间产物落盘. 两个目录必须已存在.
    pub fn with_artifacts(mut self, dirs: ArtifactDirs) -> Self {
        self.artifacts = Some(dirs);
        self
    }
}

/// 单扫描失败的具体原因. 只用于日志, 不进入结果表.
#[derive(Debug)]
enum ScanFailure {
    /// 读取扫描文件失败.
    Read(nifti::NiftiError),

    /// 外部分割模型失败.
    Segmentation(SegmentationError),

    /// 分割输出未通过体积提取的输入校验.
    Mask(InvalidMaskError),
}

/// 批处理运行统计.
#[derive(Debug, Clone)]
pub struct RunSummary {
    succeeded: u64,
    failed: u64,
    skipped: u64,
    checkpoints: u64,
    wall: Duration,
    smallest: Option<(String, f64)>,
    largest: Option<(String, f64)>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            skipped: 0,
            checkpoints: 0,
            wall: Duration::ZERO,
            smallest: None,
            largest: None,
        }
    }

    #[inline]
    fn count_succeeded(&mut self) {
        self.succeeded += 1;
    }

    #[inline]
    fn count_failed(&mut self) {
        self.failed += 1;
    }

    #[inline]
    fn count_skipped(&mut self) {
        self.skipped += 1;
    }

    #[inline]
    fn count_checkpoint(&mut self) {
        self.checkpoints += 1;
    }

    /// 结束统计: 记录总耗时, 并从最终行集提取体积极值.
    fn finish(mut self, rows: &[VolumeMeasurement], started: Instant) -> Self {
        self.wall = started.elapsed();
        let ok = rows
            .iter()
            .filter_map(|r| r.total_cm3.map(|v| (r.scan_name.clone(), v)));
        self.smallest = ok.clone().min_by_key(|(_, v)| OrderedFloat(*v));
        self.largest = ok.max_by_key(|(_, v)| OrderedFloat(*v));
        self
    }

    /// 本次运行实际尝试的扫描个数.
    #[inline]
    pub fn get_attempted(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// 本次运行成功的扫描个数.
    #[inline]
    pub fn get_succeeded(&self) -> u64 {
        self.succeeded
    }

    /// 本次运行失败的扫描个数.
    #[inline]
    pub fn get_failed(&self) -> u64 {
        self.failed
    }

    /// 因检查点恢复而跳过的扫描个数.
    #[inline]
    pub fn get_skipped(&self) -> u64 {
        self.skipped
    }

    /// 本次运行写入检查点的次数.
    #[inline]
    pub fn get_checkpoints(&self) -> u64 {
        self.checkpoints
    }

    /// 本次运行的总耗时.
    #[inline]
    pub fn get_wall_time(&self) -> Duration {
        self.wall
    }

    /// 最终行集中总体积最小的成功扫描.
    #[inline]
    pub fn get_smallest(&self) -> Option<(&str, f64)> {
        self.smallest.as_ref().map(|(n, v)| (n.as_str(), *v))
    }

    /// 最终行集中总体积最大的成功扫描.
    #[inline]
    pub fn get_largest(&self) -> Option<(&str, f64)> {
        self.largest.as_ref().map(|(n, v)| (n.as_str(), *v))
    }
}

/// 批处理最终结果: 按清单顺序累积的全部测量行, 以及运行统计.
#[derive(Debug)]
pub struct BatchOutcome {
    measurements: Vec<VolumeMeasurement>,
    summary: RunSummary,
}

impl BatchOutcome {
    /// 全部测量行, 含历次运行通过检查点恢复的部分.
    #[inline]
    pub fn measurements(&self) -> &[VolumeMeasurement] {
        &self.measurements
    }

    /// 运行统计.
    #[inline]
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// 拆出内部数据.
    #[inline]
    pub fn into_parts(self) -> (Vec<VolumeMeasurement>, RunSummary) {
        (self.measurements, self.summary)
    }
}

/// 批处理运行上下文.
///
/// 独占持有检查点状态与累积行集; 每处理满一个检查点间隔的扫描,
/// 就把进度持久化一次, 因此中断最多损失一个间隔内的工作量.
pub struct BatchRunner<S> {
    segmenter: S,
    config: BatchConfig,
    state: CheckpointState,
}

impl<S: Segmenter> BatchRunner<S> {
    /// 初始化运行上下文. 若检查点文件已存在, 则从中恢复进度.
    pub fn new(segmenter: S, config: BatchConfig) -> Result<Self, CheckpointError> {
        let state = CheckpointState::load_or_default(&config.checkpoint_path)?;
        if !state.is_empty() {
            log::info!("从检查点恢复: 已有 {} 个扫描的进度", state.len());
        }
        Ok(Self {
            segmenter,
            config,
            state,
        })
    }

    /// 按清单顺序处理每个扫描, 直至清单中的所有扫描
    /// (跨越历次重启) 都被尝试恰好一次.
    ///
    /// 输出行保持清单顺序, 与单个扫描成功与否无关;
    /// 已在检查点中的扫描被跳过, 因此重复运行是幂等的.
    pub fn run(mut self, inventory: &[ScanRecord]) -> Result<BatchOutcome, CheckpointError> {
        let started = Instant::now();
        let mut summary = RunSummary::new();
        let mut pending_rows = 0usize;

        for record in inventory {
            if self.state.is_processed(&record.scan_name) {
                summary.count_skipped();
                continue;
            }

            let row = self.attempt(record);
            match row.status {
                ScanStatus::Success => summary.count_succeeded(),
                ScanStatus::Failed => summary.count_failed(),
            }
            self.state.push(row);
            pending_rows += 1;

            if pending_rows >= self.config.checkpoint_interval.get() {
                self.state.save(&self.config.checkpoint_path)?;
                summary.count_checkpoint();
                pending_rows = 0;
                log::info!("检查点已写入 (累计 {} 行)", self.state.len());
            }
        }

        if pending_rows > 0 {
            self.state.save(&self.config.checkpoint_path)?;
            summary.count_checkpoint();
        }

        let summary = summary.finish(self.state.rows(), started);
        Ok(BatchOutcome {
            measurements: self.state.into_rows(),
            summary,
        })
    }

    /// 尝试处理单个扫描. 任何失败都折叠为 `failed` 行.
    fn attempt(&self, record: &ScanRecord) -> VolumeMeasurement {
        match self.measure(record) {
            Ok((vol, spacing)) => VolumeMeasurement::success(record, vol, spacing),
            Err((failure, spacing)) => {
                log::warn!("扫描 {} 处理失败: {failure:?}", record.scan_name);
                VolumeMeasurement::failed(record, spacing)
            }
        }
    }

    /// 单个扫描的实际工作: 读取 -> 颅骨剥离 -> 海马体分割 -> 体积计算.
    #[allow(clippy::type_complexity)]
    fn measure(
        &self,
        record: &ScanRecord,
    ) -> Result<(HippoVolume, SpacingMm), (ScanFailure, Option<SpacingMm>)> {
        let scan =
            MrScan::open(&record.header_path).map_err(|e| (ScanFailure::Read(e), None))?;
        let spacing = scan.pix_dim();

        let (brain, _mask) = self
            .segmenter
            .extract_brain(&scan)
            .map_err(|e| (ScanFailure::Segmentation(e), Some(spacing)))?;
        let label = self
            .segmenter
            .segment_hippocampus(&brain)
            .map_err(|e| (ScanFailure::Segmentation(e), Some(spacing)))?;

        // 适配器契约要求输出与输入几何一致, 但实现未必守约.
        if label.shape() != scan.shape() {
            return Err((
                ScanFailure::Segmentation(SegmentationError::GeometryMismatch {
                    expected: scan.shape(),
                    got: label.shape(),
                }),
                Some(spacing),
            ));
        }

        let vol = volume::compute_volume(label.data(), spacing)
            .map_err(|e| (ScanFailure::Mask(e), Some(spacing)))?;

        if let Some(dirs) = &self.config.artifacts {
            persist_artifacts(&record.scan_name, &brain, &label, dirs);
        }

        Ok((vol, spacing))
    }
}

/// 将成功扫描的中间产物写盘. 写入失败只记录日志, 不影响测量结果.
fn persist_artifacts(scan_name: &str, brain: &MrScan, label: &MrLabel, dirs: &ArtifactDirs) {
    let brain_path = dirs.brain_dir.join(format!("{scan_name}_brain.nii.gz"));
    if let Err(e) = brain.save(&brain_path) {
        log::warn!("写入 {} 失败: {e:?}", brain_path.display());
    }

    let hippo_path = dirs.hippo_dir.join(format!("{scan_name}_hippo.nii.gz"));
    if let Err(e) = label.save(&hippo_path) {
        log::warn!("写入 {} 失败: {e:?}", hippo_path.display());
    }
}
