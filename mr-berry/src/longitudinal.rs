//! 纵向聚合: 从多次就诊的成功测量导出每位患者的体积变化.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::batch::VolumeMeasurement;

/// 一位患者的纵向变化摘要. 由 ≥2 次成功测量派生,
/// 每次聚合都重新计算, 不作为独立事实来源持久化.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalRecord {
    /// 患者编号.
    pub patient_id: String,

    /// 成功测量的就诊次数 (≥2).
    pub n_sessions: u32,

    /// 最早的就诊编号.
    pub first_session: u32,

    /// 最晚的就诊编号.
    pub last_session: u32,

    /// 最早就诊的总体积 (cm³).
    pub first_volume_cm3: f64,

    /// 最晚就诊的总体积 (cm³).
    pub last_volume_cm3: f64,

    /// 体积变化量: `last - first`.
    pub change_cm3: f64,

    /// 体积变化百分比. 基线体积为 0 时无定义.
    pub change_pct: Option<f64>,

    /// 每次就诊间隔的平均变化速率.
    pub rate_cm3_per_session: f64,
}

/// 对测量行集做纵向聚合.
///
/// 1. 仅考虑 `status = success` 的行;
/// 2. 按患者分组, 组内按就诊编号升序;
/// 3. 丢弃成功就诊不足 2 次的患者;
/// 4. 由组内首末两行派生所有变化字段.
pub fn aggregate(measurements: &[VolumeMeasurement]) -> Vec<LongitudinalRecord> {
    let mut ok: Vec<&VolumeMeasurement> = measurements
        .iter()
        .filter(|m| m.status.is_success())
        .collect();
    ok.sort_by(|a, b| (&a.patient_id, a.session).cmp(&(&b.patient_id, b.session)));

    let mut ans = Vec::new();
    for (patient_id, group) in &ok.into_iter().group_by(|m| m.patient_id.clone()) {
        let sessions: Vec<&VolumeMeasurement> = group.collect();
        if sessions.len() < 2 {
            continue;
        }

        // 成功行必然携带体积, 可直接 unwrap.
        let first = sessions.first().unwrap();
        let last = sessions.last().unwrap();
        let first_volume_cm3 = first.total_cm3.unwrap();
        let last_volume_cm3 = last.total_cm3.unwrap();

        let change_cm3 = last_volume_cm3 - first_volume_cm3;
        // 海马体体积在实践中不会为 0, 但仍然保护除零.
        let change_pct = (first_volume_cm3 != 0.0).then(|| change_cm3 / first_volume_cm3 * 100.0);
        let rate_cm3_per_session = change_cm3 / f64::from(last.session - first.session);

        ans.push(LongitudinalRecord {
            patient_id,
            n_sessions: sessions.len() as u32,
            first_session: first.session,
            last_session: last.session,
            first_volume_cm3,
            last_volume_cm3,
            change_cm3,
            change_pct,
            rate_cm3_per_session,
        });
    }
    ans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ScanStatus;

    fn row(patient_id: &str, session: u32, total_cm3: f64) -> VolumeMeasurement {
        VolumeMeasurement {
            scan_name: format!("{patient_id}_MR{session}"),
            patient_id: patient_id.to_owned(),
            session,
            status: ScanStatus::Success,
            left_cm3: Some(total_cm3 / 2.0),
            right_cm3: Some(total_cm3 / 2.0),
            total_cm3: Some(total_cm3),
            voxel_size_mm: Some([1.0, 1.0, 1.0]),
        }
    }

    fn failed_row(patient_id: &str, session: u32) -> VolumeMeasurement {
        VolumeMeasurement {
            scan_name: format!("{patient_id}_MR{session}"),
            patient_id: patient_id.to_owned(),
            session,
            status: ScanStatus::Failed,
            left_cm3: None,
            right_cm3: None,
            total_cm3: None,
            voxel_size_mm: None,
        }
    }

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_two_session_patient() {
        let rows = [row("0001", 1, 4.77), row("0001", 2, 2.20)];
        let ans = aggregate(&rows);
        assert_eq!(ans.len(), 1);

        let rec = &ans[0];
        assert_eq!(rec.patient_id, "0001");
        assert_eq!(rec.n_sessions, 2);
        assert_eq!((rec.first_session, rec.last_session), (1, 2));
        assert!(float_eq(rec.change_cm3, -2.57));
        // -2.57 / 4.77 * 100 ≈ -53.88%.
        assert!((rec.change_pct.unwrap() - (-53.88)).abs() < 0.01);
        assert!(float_eq(rec.rate_cm3_per_session, -2.57));
    }

    #[test]
    fn test_single_session_patient_is_excluded() {
        let rows = [row("0001", 1, 4.0), row("0002", 1, 3.0), row("0002", 2, 2.5)];
        let ans = aggregate(&rows);
        assert_eq!(ans.len(), 1);
        assert_eq!(ans[0].patient_id, "0002");
    }

    #[test]
    fn test_failed_sessions_do_not_count() {
        // 0001 只有一次成功测量, 另一次失败: 不产生纵向记录.
        let rows = [row("0001", 1, 4.0), failed_row("0001", 2)];
        assert!(aggregate(&rows).is_empty());
    }

    #[test]
    fn test_sessions_are_ordered_by_number() {
        // 输入乱序, 聚合按就诊编号升序取首末.
        let rows = [row("0001", 3, 3.0), row("0001", 1, 4.0), row("0001", 2, 3.5)];
        let ans = aggregate(&rows);
        assert_eq!(ans.len(), 1);

        let rec = &ans[0];
        assert_eq!(rec.n_sessions, 3);
        assert_eq!((rec.first_session, rec.last_session), (1, 3));
        assert!(float_eq(rec.first_volume_cm3, 4.0));
        assert!(float_eq(rec.last_volume_cm3, 3.0));
        // 跨 2 个间隔共 -1.0 cm³.
        assert!(float_eq(rec.rate_cm3_per_session, -0.5));
    }

    #[test]
    fn test_zero_baseline_volume_has_undefined_pct() {
        let rows = [row("0001", 1, 0.0), row("0001", 2, 1.0)];
        let ans = aggregate(&rows);
        assert_eq!(ans.len(), 1);
        assert_eq!(ans[0].change_pct, None);
        assert!(float_eq(ans[0].change_cm3, 1.0));
    }
}
