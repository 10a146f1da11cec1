#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 OASIS 组织模式的脑部 MRI 数据的结构化信息,
//! 以及海马体体积测量流水线的全部可复用逻辑.
//!
//! 颅骨剥离与海马体分割由外部深度学习模型完成, 本 crate 只通过
//! [`segment::Segmenter`] 能力接口消费它们; crate 自身负责扫描清单构建,
//! 体素计数到物理体积的换算, 带检查点的批处理循环, 纵向聚合,
//! 以及与临床属性表的合并.
//!
//! # 注意
//!
//! 1. 该 crate 按照 OASIS 的目录命名习惯
//!   (`<STUDY>_{patient_id}_MR{session}`) 发现数据, 没有对其它组织方式
//!   进行直接适配 (但如果新数据按照该模式组织, 也可以工作).
//! 2. 预期中的失败 (单个扫描分割失败, 配对文件缺失) 以 `Result`
//!   或状态标记表达; 在非期望情况下, 程序会直接 panic,
//!   而不会导致内存错误. As what Rust promises.
//!
//! # 功能总览
//!
//! ### 扫描清单构建 ✅
//!
//! 遍历数据集根目录, 发现成对的 image/header 文件并构造有序清单.
//!
//! 实现位于 `mr-berry/src/dataset`.
//!
//! ### 外部分割模型适配 ✅
//!
//! 颅骨剥离与海马体分割的能力边界, 以及基于子进程的具体适配器.
//!
//! 实现位于 `mr-berry/src/segment.rs`.
//!
//! ### 体积提取 ✅
//!
//! 从标注体积和体素分辨率计算左/右/总海马体体积 (cm³).
//!
//! 实现位于 `mr-berry/src/volume.rs`.
//!
//! ### 带检查点的批处理 ✅
//!
//! 逐扫描运行适配器与提取器, 单扫描失败不影响整体进度,
//! 每 N 个扫描持久化一次进度, 中断后可恢复且结果幂等.
//!
//! 实现位于 `mr-berry/src/batch`.
//!
//! ### 纵向聚合 ✅
//!
//! 按患者分组, 从首末两次成功测量导出体积变化量与变化速率.
//!
//! 实现位于 `mr-berry/src/longitudinal.rs`.
//!
//! ### 临床属性合并 ✅
//!
//! 将体积结果与外部临床属性表按归一化患者号内连接,
//! 并为外部统计检验能力准备样本.
//!
//! 实现位于 `mr-berry/src/clinical.rs`.
//!
//! ### 表格输出 ✅
//!
//! 体积表 / 纵向表 / 合并表的稳定列契约.
//!
//! 实现位于 `mr-berry/src/report.rs`.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 体素分辨率, 以毫米为单位, 按 (z, h, w) 顺序存储.
pub type SpacingMm = [f64; 3];

/// 体素谓词.
type Predicate = fn(u8) -> bool;

/// 3D MRI nii 文件基础数据结构.
mod data;

pub use data::{MrLabel, MrScan, NiftiHeaderAttr};

pub mod consts;

pub mod batch;
pub mod clinical;
pub mod dataset;
pub mod longitudinal;
pub mod prelude;
pub mod report;
pub mod segment;
pub mod volume;
