//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{AnalysisResults, AnalysisSettings, IdTag, Rect};

pub use crate::align::{AlignMethod, Aligner, AlignmentEngine};
pub use crate::transform::{Affine2, Transform};
pub use crate::warp::{VolumeWarper, WarpOutput};

pub use crate::metric::{
    AxialXCorrScore, CombinedScore, FeatureRow, LateralXCorrScore, ReflectanceScore, RmseScore,
    SSimScore, Score,
};

pub use crate::store::{DirStore, MemStore, ResultStore, TransformedData};

pub use crate::measurement::{
    DirMeasurement, MemMeasurement, Measurement, MeasurementLoader, VecLoader,
};

pub use crate::config::{calibration_dir_from_env_or_home, RegistrationConfig, ScoringConfig};

pub use crate::pipeline::{Analyzer, Registrar, ScoreTable, Scorer};
