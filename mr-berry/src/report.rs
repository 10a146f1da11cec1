//! 流水线最终表格的读写. 列契约保持稳定.

use std::path::Path;

use crate::batch::VolumeMeasurement;
use crate::clinical::MergedRecord;
use crate::longitudinal::LongitudinalRecord;

/// 体积表的约定文件名.
pub const VOLUME_TABLE: &str = "hippocampus_volumes_all.csv";

/// 纵向表的约定文件名.
pub const LONGITUDINAL_TABLE: &str = "hippocampus_longitudinal.csv";

/// 临床合并表的约定文件名.
pub const MERGED_TABLE: &str = "hippocampus_clinical_merged.csv";

/// 将体积表写到 `path`.
///
/// 列: `scan_name, patient_id, session, status,
/// left_cm3, right_cm3, total_cm3, voxel_size_mm`.
/// 行序即输入顺序; 失败行的体积列为空.
pub fn write_volume_table<P: AsRef<Path>>(
    path: P,
    rows: &[VolumeMeasurement],
) -> csv::Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(csv::Error::from)
}

/// 从 `path` 读回体积表.
pub fn read_volume_table<P: AsRef<Path>>(path: P) -> csv::Result<Vec<VolumeMeasurement>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut ans = Vec::new();
    for row in reader.deserialize() {
        ans.push(row?);
    }
    Ok(ans)
}

/// 将纵向表写到 `path`.
///
/// 列: `patient_id, n_sessions, first_session, last_session,
/// first_volume_cm3, last_volume_cm3, change_cm3, change_pct,
/// rate_cm3_per_session`.
pub fn write_longitudinal_table<P: AsRef<Path>>(
    path: P,
    rows: &[LongitudinalRecord],
) -> csv::Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(csv::Error::from)
}

/// 将临床合并表写到 `path`. 列为体积表模式与临床表模式的并集.
pub fn write_merged_table<P: AsRef<Path>>(path: P, rows: &[MergedRecord]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(csv::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ScanStatus;

    fn success_row() -> VolumeMeasurement {
        VolumeMeasurement {
            scan_name: "0001_MR1".to_owned(),
            patient_id: "0001".to_owned(),
            session: 1,
            status: ScanStatus::Success,
            left_cm3: Some(2.11),
            right_cm3: Some(2.3),
            total_cm3: Some(4.41),
            voxel_size_mm: Some([1.25, 1.0, 1.0]),
        }
    }

    fn failed_row() -> VolumeMeasurement {
        VolumeMeasurement {
            scan_name: "0002_MR1".to_owned(),
            patient_id: "0002".to_owned(),
            session: 1,
            status: ScanStatus::Failed,
            left_cm3: None,
            right_cm3: None,
            total_cm3: None,
            voxel_size_mm: None,
        }
    }

    #[test]
    fn test_volume_table_column_contract() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(VOLUME_TABLE);

        write_volume_table(&path, &[success_row(), failed_row()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "scan_name,patient_id,session,status,left_cm3,right_cm3,total_cm3,voxel_size_mm"
        );
        assert_eq!(
            lines.next().unwrap(),
            "0001_MR1,0001,1,success,2.11,2.3,4.41,1.25x1x1"
        );
        // 失败行的体积与分辨率列为空.
        assert_eq!(lines.next().unwrap(), "0002_MR1,0002,1,failed,,,,");
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_volume_table_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(VOLUME_TABLE);

        let rows = vec![success_row(), failed_row()];
        write_volume_table(&path, &rows).unwrap();

        let restored = read_volume_table(&path).unwrap();
        assert_eq!(restored, rows);
    }

    #[test]
    fn test_longitudinal_table_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(LONGITUDINAL_TABLE);

        let rec = crate::longitudinal::LongitudinalRecord {
            patient_id: "0001".to_owned(),
            n_sessions: 2,
            first_session: 1,
            last_session: 2,
            first_volume_cm3: 4.77,
            last_volume_cm3: 2.2,
            change_cm3: -2.57,
            change_pct: None,
            rate_cm3_per_session: -2.57,
        };
        write_longitudinal_table(&path, &[rec]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "patient_id,n_sessions,first_session,last_session,first_volume_cm3,\
             last_volume_cm3,change_cm3,change_pct,rate_cm3_per_session"
        );
        // 无定义的 change_pct 落为空单元格.
        assert_eq!(lines.next().unwrap(), "0001,2,1,2,4.77,2.2,-2.57,,-2.57");
    }
}
