//! 程序运行函数.

use std::fs;

use mr_berry::prelude::*;
use mr_berry::{clinical, longitudinal, report};
use utils::loader;

use crate::result::StudyResult;

/// 实际运行.
pub fn run() -> StudyResult {
    let scan_dir = loader::scan_dir_from_env_or_home();
    assert!(scan_dir.is_dir(), "Scan directory config error");

    let results_dir = loader::results_dir_from_env_or_home();
    let volumes_dir = results_dir.join("volumes");
    let brain_dir = results_dir.join("skull_stripped");
    let hippo_dir = results_dir.join("hippocampus_segmentation");
    for dir in [&volumes_dir, &brain_dir, &hippo_dir] {
        fs::create_dir_all(dir).expect("Results directory config error");
    }

    let inventory = build_inventory(&scan_dir).expect("Scan inventory config error");
    log::info!("清单共发现 {} 个扫描", inventory.len());

    let segmenter = ToolSegmenter::new(
        loader::brain_tool_from_env(),
        loader::hippo_tool_from_env(),
        results_dir.join("exchange"),
    )
    .expect("Exchange directory config error");

    let config = BatchConfig::new(volumes_dir.join("checkpoint.bin.gz"))
        .with_interval(loader::checkpoint_interval_from_env())
        .with_artifacts(ArtifactDirs {
            brain_dir,
            hippo_dir,
        });

    let outcome = BatchRunner::new(segmenter, config)
        .expect("Checkpoint load error")
        .run(&inventory)
        .expect("Checkpoint write error");
    let (measurements, summary) = outcome.into_parts();

    report::write_volume_table(volumes_dir.join(report::VOLUME_TABLE), &measurements)
        .expect("Volume table write error");

    let longitudinal_rows = longitudinal::aggregate(&measurements);
    report::write_longitudinal_table(
        volumes_dir.join(report::LONGITUDINAL_TABLE),
        &longitudinal_rows,
    )
    .expect("Longitudinal table write error");

    // 临床合并是可选环节; 统计检验交由外部能力, 此处只产出合并表.
    let merged_rows = match loader::clinical_table_from_env() {
        Some(path) => {
            let table = clinical::read_clinical_table(&path).expect("Clinical table read error");
            let merged = clinical::merge(&measurements, &table);
            report::write_merged_table(volumes_dir.join(report::MERGED_TABLE), &merged)
                .expect("Merged table write error");
            Some(merged.len())
        }
        None => {
            log::info!("未设置 $OASIS_CLINICAL_TABLE, 跳过临床合并");
            None
        }
    };

    StudyResult::new(
        summary,
        measurements.len(),
        longitudinal_rows.len(),
        merged_rows,
        volumes_dir,
    )
}
