/// Failure-risk modelling over tabular sensor uploads.
///
/// Uploads flow through `validation` into typed datasets. Training splits
/// them (`split`), fits a bagged tree ensemble (`classifier`) and stores the
/// result as an artifact (`artifacts`). Prediction keeps the latest row per
/// asset (`inference`) and maps probabilities to tiers (`risk`). `service`
/// wires the steps to the store.
pub mod artifacts;
pub mod classifier;
pub mod inference;
pub mod models;
pub mod risk;
pub mod service;
pub mod split;
pub mod validation;

pub use artifacts::ArtifactStore;
pub use classifier::{ProbabilisticClassifier, RandomForestClassifier, TrainedArtifact};
pub use inference::{assess, select_latest_per_asset};
pub use models::{
    Metrics, ModelMetadata, PipelineSettings, PredictOutcome, PredictResponse, SplitPlan,
    TrainResponse, TrainingSampleRecord, ACCURACY, ROC_AUC,
};
pub use risk::{classify, CRITICAL_THRESHOLD, WARNING_THRESHOLD};
pub use service::RiskPipeline;
pub use split::plan_split;
pub use validation::{read_csv_upload, validate_inference, validate_training, RawTable};
