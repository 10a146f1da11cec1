//! 临床属性合并与统计验证的准备工作.
//!
//! 本模块只负责连接与样本准备; 假设检验 (t 检验, ANOVA,
//! Pearson/Spearman 相关) 是外部统计能力, 通过 [`StatTest`]
//! 接口注入, 与分割模型一样按黑盒消费.

use std::collections::HashMap;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::batch::{ScanStatus, VolumeMeasurement};
use crate::consts::PATIENT_ID_WIDTH;
use crate::SpacingMm;

/// 临床属性表中的一行. 以患者为键.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    /// 患者编号 (允许携带研究前缀, 合并时归一化).
    pub patient_id: String,

    /// 诊断分组 (如 Demented / Nondemented / Converted).
    pub group: String,

    /// 临床痴呆评级 (CDR).
    #[serde(deserialize_with = "csv::invalid_option")]
    pub cdr: Option<f64>,

    /// 认知测验得分 (MMSE).
    #[serde(deserialize_with = "csv::invalid_option")]
    pub mmse: Option<f64>,

    /// 年龄.
    #[serde(deserialize_with = "csv::invalid_option")]
    pub age: Option<u32>,
}

/// 从 CSV 文件读入临床属性表.
pub fn read_clinical_table<P: AsRef<Path>>(path: P) -> csv::Result<Vec<ClinicalRecord>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut ans = Vec::new();
    for record in reader.deserialize() {
        ans.push(record?);
    }
    Ok(ans)
}

/// 将患者编号归一化为定宽前导零数字串.
///
/// 接受裸数字 (`"1"`), 定宽数字 (`"0001"`) 或带研究前缀的形式
/// (`"OAS2_0001"`), 统一取末尾数字段并补零到 `width` 位.
/// 不含数字的输入返回 `None`.
pub fn normalize_patient_id(raw: &str, width: usize) -> Option<String> {
    let digits: String = raw
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("{digits:0>width$}"))
}

/// 体积表与临床表内连接后的一行: 两个输入模式的并集.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    /// 规范扫描名.
    pub scan_name: String,

    /// 归一化后的患者编号.
    pub patient_id: String,

    /// 就诊/会话编号.
    pub session: u32,

    /// 测量终态.
    pub status: ScanStatus,

    /// 左侧海马体体积 (cm³).
    pub left_cm3: Option<f64>,

    /// 右侧海马体体积 (cm³).
    pub right_cm3: Option<f64>,

    /// 总体积 (cm³).
    pub total_cm3: Option<f64>,

    /// 体素分辨率 (mm).
    #[serde(with = "crate::batch::voxel_size_fmt")]
    pub voxel_size_mm: Option<SpacingMm>,

    /// 诊断分组.
    pub group: String,

    /// 临床痴呆评级.
    pub cdr: Option<f64>,

    /// 认知测验得分.
    pub mmse: Option<f64>,

    /// 年龄.
    pub age: Option<u32>,
}

/// 体积结果与临床属性表的内连接.
///
/// 连接键为归一化患者编号. 没有对应临床行的体积行被静默丢弃
/// (只体现在合并行数的减少上), 但仍保留在原始体积表中;
/// 编号无法归一化的临床行同样被忽略.
pub fn merge(
    measurements: &[VolumeMeasurement],
    clinical: &[ClinicalRecord],
) -> Vec<MergedRecord> {
    let by_patient: HashMap<String, &ClinicalRecord> = clinical
        .iter()
        .filter_map(|c| {
            normalize_patient_id(&c.patient_id, PATIENT_ID_WIDTH).map(|id| (id, c))
        })
        .collect();

    let mut ans = Vec::new();
    for m in measurements {
        let Some(patient_id) = normalize_patient_id(&m.patient_id, PATIENT_ID_WIDTH) else {
            continue;
        };
        let Some(c) = by_patient.get(&patient_id) else {
            log::debug!("患者 {patient_id} 无临床属性, 自合并表中丢弃");
            continue;
        };
        ans.push(MergedRecord {
            scan_name: m.scan_name.clone(),
            patient_id,
            session: m.session,
            status: m.status,
            left_cm3: m.left_cm3,
            right_cm3: m.right_cm3,
            total_cm3: m.total_cm3,
            voxel_size_mm: m.voxel_size_mm,
            group: c.group.clone(),
            cdr: c.cdr,
            mmse: c.mmse,
            age: c.age,
        });
    }
    ans
}

/// 外部统计检验的输出: 检验统计量与 p 值.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    /// 检验统计量.
    pub statistic: f64,

    /// p 值.
    pub p_value: f64,
}

/// 外部统计检验能力.
///
/// 契约: 给定两组数值/有序样本, 返回检验统计量和 p 值,
/// 调用之间不保留任何内部状态. 具体检验 (t 检验, ANOVA,
/// Pearson/Spearman) 由实现方决定, 本 crate 不实现任何一种.
pub trait StatTest {
    /// 对两组样本执行检验.
    fn eval(&self, a: &[f64], b: &[f64]) -> TestOutcome;
}

/// 按诊断分组收集成功测量的总体积样本.
/// 分组顺序按其在合并表中首次出现的顺序.
pub fn group_samples(merged: &[MergedRecord]) -> Vec<(String, Vec<f64>)> {
    let mut ans: Vec<(String, Vec<f64>)> = Vec::new();
    for m in merged {
        let Some(total) = m.total_cm3 else { continue };
        match ans.iter_mut().find(|(g, _)| *g == m.group) {
            Some((_, samples)) => samples.push(total),
            None => ans.push((m.group.clone(), vec![total])),
        }
    }
    ans
}

/// 收集 (总体积, 临床属性) 配对样本, 用于相关性检验.
/// 只纳入体积与属性同时存在的行.
pub fn paired_samples<F>(merged: &[MergedRecord], attr: F) -> (Vec<f64>, Vec<f64>)
where
    F: Fn(&MergedRecord) -> Option<f64>,
{
    let mut volumes = Vec::new();
    let mut attrs = Vec::new();
    for m in merged {
        if let (Some(v), Some(a)) = (m.total_cm3, attr(m)) {
            volumes.push(v);
            attrs.push(a);
        }
    }
    (volumes, attrs)
}

/// 一对诊断分组间的检验结果.
#[derive(Debug, Clone)]
pub struct GroupComparison {
    /// 第一组名.
    pub left: String,

    /// 第二组名.
    pub right: String,

    /// 外部检验输出.
    pub outcome: TestOutcome,
}

/// 对每一对诊断分组执行外部检验.
pub fn compare_groups<T: StatTest>(merged: &[MergedRecord], test: &T) -> Vec<GroupComparison> {
    group_samples(merged)
        .iter()
        .tuple_combinations()
        .map(|((ga, sa), (gb, sb))| GroupComparison {
            left: ga.clone(),
            right: gb.clone(),
            outcome: test.eval(sa, sb),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ScanStatus;

    fn measurement(patient_id: &str, session: u32, total: Option<f64>) -> VolumeMeasurement {
        VolumeMeasurement {
            scan_name: format!("{patient_id}_MR{session}"),
            patient_id: patient_id.to_owned(),
            session,
            status: if total.is_some() {
                ScanStatus::Success
            } else {
                ScanStatus::Failed
            },
            left_cm3: total.map(|t| t / 2.0),
            right_cm3: total.map(|t| t / 2.0),
            total_cm3: total,
            voxel_size_mm: Some([1.0, 1.0, 1.0]),
        }
    }

    fn clinical(patient_id: &str, group: &str) -> ClinicalRecord {
        ClinicalRecord {
            patient_id: patient_id.to_owned(),
            group: group.to_owned(),
            cdr: Some(0.5),
            mmse: Some(27.0),
            age: Some(80),
        }
    }

    #[test]
    fn test_normalize_patient_id() {
        assert_eq!(normalize_patient_id("1", 4).unwrap(), "0001");
        assert_eq!(normalize_patient_id("0001", 4).unwrap(), "0001");
        assert_eq!(normalize_patient_id("OAS2_0042", 4).unwrap(), "0042");
        assert_eq!(normalize_patient_id("12345", 4).unwrap(), "12345");
        assert_eq!(normalize_patient_id("OAS2_", 4), None);
        assert_eq!(normalize_patient_id("", 4), None);
    }

    #[test]
    fn test_merge_inner_join_semantics() {
        let measurements = [
            measurement("0001", 1, Some(4.0)),
            measurement("0002", 1, Some(3.0)),
            // 无临床行, 应被丢弃.
            measurement("0003", 1, Some(5.0)),
        ];
        let table = [clinical("OAS2_0001", "Demented"), clinical("2", "Nondemented")];

        let merged = merge(&measurements, &table);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].patient_id, "0001");
        assert_eq!(merged[0].group, "Demented");
        assert_eq!(merged[1].patient_id, "0002");
        assert_eq!(merged[1].group, "Nondemented");

        // 被丢弃的行仍在体积表中 (输入不被修改).
        assert_eq!(measurements.len(), 3);
    }

    #[test]
    fn test_group_samples_skips_failed_rows() {
        let measurements = [
            measurement("0001", 1, Some(4.0)),
            measurement("0001", 2, None),
            measurement("0002", 1, Some(3.0)),
        ];
        let table = [clinical("0001", "Demented"), clinical("0002", "Demented")];

        let merged = merge(&measurements, &table);
        assert_eq!(merged.len(), 3);

        let groups = group_samples(&merged);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "Demented");
        assert_eq!(groups[0].1, vec![4.0, 3.0]);
    }

    #[test]
    fn test_paired_samples() {
        let measurements = [
            measurement("0001", 1, Some(4.0)),
            measurement("0002", 1, Some(3.0)),
        ];
        let mut table = vec![clinical("0001", "Demented")];
        table.push(ClinicalRecord {
            mmse: None,
            ..clinical("0002", "Nondemented")
        });

        let merged = merge(&measurements, &table);
        let (volumes, scores) = paired_samples(&merged, |m| m.mmse);
        // 0002 缺少 MMSE, 不进入配对样本.
        assert_eq!(volumes, vec![4.0]);
        assert_eq!(scores, vec![27.0]);
    }

    /// 验证调用形状用的假检验: 统计量为样本均值之差.
    struct MeanDiff;

    impl StatTest for MeanDiff {
        fn eval(&self, a: &[f64], b: &[f64]) -> TestOutcome {
            let mean = |s: &[f64]| s.iter().sum::<f64>() / s.len() as f64;
            TestOutcome {
                statistic: mean(a) - mean(b),
                p_value: 0.05,
            }
        }
    }

    #[test]
    fn test_compare_groups_pairwise() {
        let measurements = [
            measurement("0001", 1, Some(4.0)),
            measurement("0002", 1, Some(2.0)),
            measurement("0003", 1, Some(3.0)),
        ];
        let table = [
            clinical("0001", "Demented"),
            clinical("0002", "Nondemented"),
            clinical("0003", "Converted"),
        ];

        let merged = merge(&measurements, &table);
        let comparisons = compare_groups(&merged, &MeanDiff);

        // 三组两两比较.
        assert_eq!(comparisons.len(), 3);
        let first = &comparisons[0];
        assert_eq!((first.left.as_str(), first.right.as_str()), ("Demented", "Nondemented"));
        assert!((first.outcome.statistic - 2.0).abs() < 1e-9);
    }
}
