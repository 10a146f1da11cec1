//! 外部分割模型的能力边界.
//!
//! 颅骨剥离网络与海马体分割网络 (HippMapp3r) 都是不透明的外部服务:
//! 核心流水线只依赖本模块定义的输入/输出契约, 不关心模型内部.
//! 两个模型对输入几何形状都有未公开的约束, 被拒绝的输入统一以
//! [`SegmentationError`] 表达, 由批处理层按单扫描失败处理.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Idx3d, MrLabel, MrScan, NiftiHeaderAttr};

/// 分割失败. 对核心流水线而言这是唯一的分割错误面,
/// 任何变体都按可恢复的单扫描失败处理.
#[derive(Debug)]
pub enum SegmentationError {
    /// 模型输出与输入体积的几何形状不一致.
    GeometryMismatch {
        /// 输入体积的形状.
        expected: Idx3d,

        /// 模型输出的形状.
        got: Idx3d,
    },

    /// 外部模型进程以非零状态退出.
    /// 这是现实中占主导的失败模式 (输入维度不兼容).
    Rejected(ExitStatus),

    /// 与外部模型交换数据时的底层 I/O 错误.
    IoError(io::Error),

    /// 无法将输入体积写入交换目录, 或无法读回模型输出.
    ExchangeError(nifti::NiftiError),
}

/// 分割能力接口.
///
/// 两个方法都是对内存中体积的纯函数调用; 实现内部可以任意并行,
/// 但对调用方表现为阻塞的黑盒.
pub trait Segmenter {
    /// 颅骨剥离. 返回被脑组织掩码约束后的体积和掩码本身 (0/1).
    fn extract_brain(&self, scan: &MrScan) -> Result<(MrScan, MrLabel), SegmentationError>;

    /// 海马体分割. 输入应为颅骨剥离后的体积,
    /// 返回与输入几何形状一致的标注 (0/1/2).
    fn segment_hippocampus(&self, brain: &MrScan) -> Result<MrLabel, SegmentationError>;
}

impl<S: Segmenter + ?Sized> Segmenter for &S {
    #[inline]
    fn extract_brain(&self, scan: &MrScan) -> Result<(MrScan, MrLabel), SegmentationError> {
        (**self).extract_brain(scan)
    }

    #[inline]
    fn segment_hippocampus(&self, brain: &MrScan) -> Result<MrLabel, SegmentationError> {
        (**self).segment_hippocampus(brain)
    }
}

/// 基于命令行工具的分割适配器.
///
/// 每次调用把输入体积写为交换目录下的压缩 nifti 文件, 以
/// `<tool> --in <输入> --out <输出>` 约定启动外部模型进程,
/// 然后读回输出文件. 交换文件名内含单调递增序号, 同一适配器
/// 实例的多次调用不会互相覆盖.
pub struct ToolSegmenter {
    brain_tool: PathBuf,
    hippo_tool: PathBuf,
    work_dir: PathBuf,
    turn: AtomicUsize,
}

impl ToolSegmenter {
    /// 初始化. `work_dir` 不存在时会被创建.
    pub fn new(
        brain_tool: impl AsRef<Path>,
        hippo_tool: impl AsRef<Path>,
        work_dir: impl AsRef<Path>,
    ) -> io::Result<Self> {
        let work_dir = work_dir.as_ref().to_owned();
        std::fs::create_dir_all(&work_dir)?;
        Ok(Self {
            brain_tool: brain_tool.as_ref().to_owned(),
            hippo_tool: hippo_tool.as_ref().to_owned(),
            work_dir,
            turn: AtomicUsize::new(0),
        })
    }

    fn next_slot(&self) -> usize {
        self.turn.fetch_add(1, Ordering::Relaxed)
    }

    /// 以 `tool` 处理 `input`, 返回读回的标注输出.
    fn run_tool(&self, tool: &Path, input: &MrScan) -> Result<MrLabel, SegmentationError> {
        let slot = self.next_slot();
        let in_path = self.work_dir.join(format!("exchange-{slot}-in.nii.gz"));
        let out_path = self.work_dir.join(format!("exchange-{slot}-out.nii.gz"));

        input
            .save(&in_path)
            .map_err(SegmentationError::ExchangeError)?;

        let status = Command::new(tool)
            .arg("--in")
            .arg(&in_path)
            .arg("--out")
            .arg(&out_path)
            .status()
            .map_err(SegmentationError::IoError)?;
        if !status.success() {
            let _ = std::fs::remove_file(&in_path);
            return Err(SegmentationError::Rejected(status));
        }

        let label = MrLabel::open(&out_path).map_err(SegmentationError::ExchangeError)?;

        // 交换文件清理失败不影响结果.
        let _ = std::fs::remove_file(&in_path);
        let _ = std::fs::remove_file(&out_path);

        if label.shape() != input.shape() {
            return Err(SegmentationError::GeometryMismatch {
                expected: input.shape(),
                got: label.shape(),
            });
        }
        Ok(label)
    }
}

impl Segmenter for ToolSegmenter {
    fn extract_brain(&self, scan: &MrScan) -> Result<(MrScan, MrLabel), SegmentationError> {
        let mask = self.run_tool(&self.brain_tool, scan)?;
        let brain = scan.masked(&mask);
        Ok((brain, mask))
    }

    fn segment_hippocampus(&self, brain: &MrScan) -> Result<MrLabel, SegmentationError> {
        self.run_tool(&self.hippo_tool, brain)
    }
}
