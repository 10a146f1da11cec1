//! 🧠欢迎光临🫐
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, SpacingMm};

pub use crate::data::{MrLabel, MrScan, NiftiHeaderAttr};

pub use crate::consts::label::{
    BRAIN_FOREGROUND, HIPPO_BACKGROUND, HIPPO_LEFT, HIPPO_RIGHT,
};
pub use crate::consts::{DEFAULT_CHECKPOINT_INTERVAL, MM3_PER_CM3, PATIENT_ID_WIDTH};

pub use crate::dataset::{self, build_inventory, home_dataset_dir_with, ScanRecord};

pub use crate::segment::{SegmentationError, Segmenter, ToolSegmenter};

pub use crate::volume::{compute_volume, HippoVolume};

pub use crate::batch::{
    ArtifactDirs, BatchConfig, BatchOutcome, BatchRunner, RunSummary, ScanStatus,
    VolumeMeasurement,
};

pub use crate::longitudinal::{aggregate, LongitudinalRecord};

pub use crate::clinical::{merge, normalize_patient_id, ClinicalRecord, MergedRecord, StatTest};
