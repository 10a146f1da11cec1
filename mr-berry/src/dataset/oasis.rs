//! OASIS 组织模式的扫描清单构建.
//!
//! 数据集根目录下, 每个扫描以 `<STUDY>_{patient_id}_MR{session}`
//! 命名的子目录存在, 目录内某处存放着成对的 Analyze/nifti
//! image (`.img`) 与 header (`.hdr`) 文件.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 一个被发现的扫描. 由清单构建器一次性创建, 此后不可变.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// 患者编号, 定宽前导零数字串.
    pub patient_id: String,

    /// 就诊/会话编号, 从 1 开始.
    pub session: u32,

    /// 规范扫描名, 形如 `{patient_id}_MR{session}`. 全局唯一键.
    pub scan_name: String,

    /// image 文件路径.
    pub image_path: PathBuf,

    /// 与 image 配对的 header 文件路径.
    pub header_path: PathBuf,
}

/// 清单构建错误. 属于致命的配置错误, 调用方应当中止运行.
#[derive(Debug)]
pub enum InventoryError {
    /// 根目录不存在或不是目录.
    RootNotDir(PathBuf),

    /// 遍历根目录时的底层 I/O 错误.
    IoError(io::Error),
}

/// 解析形如 `<STUDY>_{patient_id}_MR{session}` 的扫描目录名.
///
/// 返回 `(patient_id, session)`. 不满足该模式的目录名返回 `None`.
pub fn parse_scan_dir_name(name: &str) -> Option<(String, u32)> {
    let mut parts = name.split('_');
    let _study = parts.next()?;
    let patient_id = parts.next()?;
    let session = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    if patient_id.is_empty() || !patient_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let session: u32 = session.strip_prefix("MR")?.parse().ok()?;
    if session == 0 {
        return None;
    }

    Some((patient_id.to_owned(), session))
}

/// 遍历 `root` 下的所有扫描目录, 构建有序扫描清单.
///
/// 1. 仅收录目录名符合命名模式, 且内部存在配对 `.img`/`.hdr`
///   文件的扫描; 配对不完整的目录会被记录日志并静默排除
///   (文件缺失是采集环节的常态, 不是程序错误).
/// 2. 结果按 (patient_id, session) 升序排序, 保证下游处理的确定性.
/// 3. `root` 缺失或不可读是致命配置错误, 以 `Err` 报告给调用方.
pub fn build_inventory<P: AsRef<Path>>(root: P) -> Result<Vec<ScanRecord>, InventoryError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(InventoryError::RootNotDir(root.to_owned()));
    }

    let mut records = Vec::new();
    for entry in sorted_entries(root).map_err(InventoryError::IoError)? {
        if !entry.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((patient_id, session)) = parse_scan_dir_name(name) else {
            continue;
        };

        let scan_name = format!("{patient_id}_MR{session}");
        match find_image_pair(&entry).map_err(InventoryError::IoError)? {
            Some((image_path, header_path)) => records.push(ScanRecord {
                patient_id,
                session,
                scan_name,
                image_path,
                header_path,
            }),
            None => {
                log::warn!("扫描 {scan_name} 缺少配对的 image/header 文件, 已排除");
            }
        }
    }

    records.sort_by(|a, b| {
        (&a.patient_id, a.session).cmp(&(&b.patient_id, b.session))
    });
    Ok(records)
}

/// 读取 `dir` 的下级条目并按文件名排序, 以保证遍历顺序确定.
fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    entries.sort();
    Ok(entries)
}

/// 在扫描目录下递归寻找第一个配对完整的 (image, header) 文件对.
fn find_image_pair(dir: &Path) -> io::Result<Option<(PathBuf, PathBuf)>> {
    let mut stack = vec![dir.to_owned()];
    while let Some(cur) = stack.pop() {
        let mut subdirs = Vec::new();
        for path in sorted_entries(&cur)? {
            if path.is_dir() {
                subdirs.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".img") else {
                continue;
            };
            let header = path.with_file_name(format!("{stem}.hdr"));
            if header.is_file() {
                return Ok(Some((path, header)));
            }
        }
        // 深度优先, 同层按文件名逆序入栈以保持字典序出栈.
        subdirs.reverse();
        stack.extend(subdirs);
    }
    Ok(None)
}
