//! 对 `mr-berry::dataset` 的更一层封装. 提供更直接的运行配置解析.

use mr_berry::consts::DEFAULT_CHECKPOINT_INTERVAL;
use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// 获取 OASIS 扫描数据集根目录.
///
/// 1. 若环境变量 `$OASIS_SCAN_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/oasis/scans`.
pub fn scan_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("OASIS_SCAN_DIR") {
        PathBuf::from(d)
    } else {
        mr_berry::dataset::home_dataset_dir_with(["oasis", "scans"]).unwrap()
    }
}

/// 获取结果输出根目录.
///
/// 1. 若环境变量 `$HIPPO_RESULTS_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/oasis/results`.
pub fn results_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("HIPPO_RESULTS_DIR") {
        PathBuf::from(d)
    } else {
        mr_berry::dataset::home_dataset_dir_with(["oasis", "results"]).unwrap()
    }
}

/// 获取临床属性表路径 (`$OASIS_CLINICAL_TABLE`).
/// 未设置时返回 `None`, 此时跳过临床合并环节.
pub fn clinical_table_from_env() -> Option<PathBuf> {
    env::var("OASIS_CLINICAL_TABLE").ok().map(PathBuf::from)
}

/// 获取检查点间隔 (`$HIPPO_CHECKPOINT_INTERVAL`, 以扫描个数计).
///
/// 未设置或取值非法时回落到默认值.
pub fn checkpoint_interval_from_env() -> NonZeroUsize {
    env::var("HIPPO_CHECKPOINT_INTERVAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| {
            // 该常量非零, 可直接 unwrap.
            NonZeroUsize::new(DEFAULT_CHECKPOINT_INTERVAL).unwrap()
        })
}

/// 获取颅骨剥离模型命令 (`$BRAIN_EXTRACT_TOOL`, 默认 `seg_brain`).
pub fn brain_tool_from_env() -> PathBuf {
    env::var("BRAIN_EXTRACT_TOOL")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("seg_brain"))
}

/// 获取海马体分割模型命令 (`$HIPPO_SEG_TOOL`, 默认 `seg_hipp`).
pub fn hippo_tool_from_env() -> PathBuf {
    env::var("HIPPO_SEG_TOOL")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("seg_hipp"))
}
