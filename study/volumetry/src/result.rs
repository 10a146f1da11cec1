//! 运行结果.

use std::io::{self, Write};
use std::path::PathBuf;

use mr_berry::batch::RunSummary;

/// 将运行结果写进 `w` 中.
fn describe_into<W: Write>(r: &StudyResult, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn extremum_to_display(v: Option<(&str, f64)>) -> String {
        match v {
            Some((name, vol)) => format!("{name} ({vol:.2} cm3)"),
            None => "/".to_string(),
        }
    }

    let s = &r.summary;
    writeln!(w, "Volumetry run:")?;
    writeln!(w, "{S4}Scans attempted: {}", s.get_attempted())?;
    writeln!(w, "{S4}Succeeded: {}", s.get_succeeded())?;
    writeln!(w, "{S4}Failed: {}", s.get_failed())?;
    writeln!(w, "{S4}Restored from checkpoint: {}", s.get_skipped())?;
    writeln!(w, "{S4}Checkpoints written: {}", s.get_checkpoints())?;
    writeln!(w, "{S4}Wall time: {} ms", s.get_wall_time().as_millis())?;
    writeln!(
        w,
        "{S4}Smallest volume: {}",
        extremum_to_display(s.get_smallest())
    )?;
    writeln!(
        w,
        "{S4}Largest volume: {}",
        extremum_to_display(s.get_largest())
    )?;
    writeln!(w, "{S4}Volume rows: {}", r.volume_rows)?;
    writeln!(w, "{S4}Longitudinal rows: {}", r.longitudinal_rows)?;
    match r.merged_rows {
        Some(n) => writeln!(w, "{S4}Merged rows: {n}")?,
        None => writeln!(w, "{S4}Merged rows: / (no clinical table)")?,
    }
    write!(w, "{S4}Tables under: {}", r.tables_dir.display())
}

/// 研究运行最终结果.
pub struct StudyResult {
    summary: RunSummary,
    volume_rows: usize,
    longitudinal_rows: usize,
    merged_rows: Option<usize>,
    tables_dir: PathBuf,
}

impl StudyResult {
    pub fn new(
        summary: RunSummary,
        volume_rows: usize,
        longitudinal_rows: usize,
        merged_rows: Option<usize>,
        tables_dir: PathBuf,
    ) -> Self {
        Self {
            summary,
            volume_rows,
            longitudinal_rows,
            merged_rows,
            tables_dir,
        }
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);
        describe_into(self, &mut buf).unwrap();
        println!("{}", std::str::from_utf8(&buf).unwrap());
        utils::sep();
    }
}
