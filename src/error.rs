use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
///
/// Variants above the internal section are caused by user input and are
/// reported verbatim. Everything else is logged and surfaced as a generic
/// internal failure.
#[derive(Error, Debug)]
pub enum AppError {
    /// Upload rejected before parsing (extension, encoding, CSV syntax)
    #[error("{0}")]
    Upload(String),

    /// Required columns absent from the uploaded table
    #[error("Missing required columns: {}", .missing_columns.join(", "))]
    Schema { missing_columns: Vec<String> },

    /// Cells that could not be coerced to their column type
    #[error("{}", describe_invalid_values(.bad_timestamp_rows, .bad_sensor_rows, .bad_label_rows))]
    InvalidValues {
        bad_timestamp_rows: usize,
        bad_sensor_rows: usize,
        bad_label_rows: Option<usize>,
    },

    /// Label outside {0, 1}
    #[error("Label must be 0 or 1")]
    LabelDomain,

    /// Training data with a single label value
    #[error("Training data must contain at least one positive (label=1) and one negative (label=0) row")]
    InsufficientClasses,

    /// Zero rows where at least one is required
    #[error("CSV contains no rows")]
    EmptyDataset,

    /// No metadata recorded for the requested model
    #[error("Unknown model_id: {0}")]
    UnknownModel(String),

    /// Metadata exists but no readable artifact
    #[error("Model artifact not found on disk for model_id {0}")]
    ArtifactNotFound(String),

    /// Artifact cannot produce usable binary probabilities
    #[error("Incompatible model: {0}")]
    IncompatibleModel(String),

    /// Malformed request (missing form fields, bad query parameters)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    // Internal failures

    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Classifier fit or predict failures
    #[error("Training error: {0}")]
    Training(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_invalid_values(
    bad_timestamp_rows: &usize,
    bad_sensor_rows: &usize,
    bad_label_rows: &Option<usize>,
) -> String {
    let mut message = format!(
        "Invalid values detected after parsing. bad_timestamp_rows={}, bad_sensor_rows={}",
        bad_timestamp_rows, bad_sensor_rows
    );
    if let Some(bad_label_rows) = bad_label_rows {
        message.push_str(&format!(", bad_label_rows={}", bad_label_rows));
    }
    message
}

impl AppError {
    /// Whether the error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Upload(_)
                | AppError::Schema { .. }
                | AppError::InvalidValues { .. }
                | AppError::LabelDomain
                | AppError::InsufficientClasses
                | AppError::EmptyDataset
                | AppError::UnknownModel(_)
                | AppError::ArtifactNotFound(_)
                | AppError::IncompatibleModel(_)
                | AppError::Validation(_)
                | AppError::NotFound(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Upload(_) => "UPLOAD_ERROR",
            AppError::Schema { .. } => "SCHEMA_ERROR",
            AppError::InvalidValues { .. } => "VALIDATION_ERROR",
            AppError::LabelDomain => "LABEL_DOMAIN_ERROR",
            AppError::InsufficientClasses => "INSUFFICIENT_CLASSES",
            AppError::EmptyDataset => "EMPTY_DATASET",
            AppError::UnknownModel(_) => "UNKNOWN_MODEL",
            AppError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            AppError::IncompatibleModel(_) => "INCOMPATIBLE_MODEL",
            AppError::Validation(_) => "INVALID_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Training(_) => "TRAINING_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to API clients
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "Internal server error".to_string()
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if self.is_client_error() {
            tracing::warn!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %self,
                "Request rejected"
            );
        } else {
            tracing::error!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %self,
                "Request failed"
            );
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.public_message(),
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from sled::Error
impl From<sled::Error> for AppError {
    fn from(err: sled::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
