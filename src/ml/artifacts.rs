use crate::error::{AppError, Result};
use crate::ml::classifier::TrainedArtifact;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const ARTIFACT_EXTENSION: &str = "bin";

/// Filesystem home for fitted models, one bincode file per model_id
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{dir}/{model_id}.bin`
    pub fn default_path(&self, model_id: &Uuid) -> PathBuf {
        self.dir
            .join(model_id.to_string())
            .with_extension(ARTIFACT_EXTENSION)
    }

    /// Write the artifact to its default path and return that path
    pub fn save(&self, model_id: &Uuid, artifact: &TrainedArtifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.default_path(model_id);
        let bytes = bincode::serialize(artifact)?;
        fs::write(&path, bytes)?;

        tracing::debug!(model_id = %model_id, path = %path.display(), "Saved model artifact");
        Ok(path)
    }

    /// Load the first candidate that reads and decodes.
    ///
    /// The recorded location is tried before the default path; unusable
    /// candidates are skipped with a warning.
    pub fn load(&self, model_id: &Uuid, recorded: &str) -> Result<TrainedArtifact> {
        let mut candidates = Vec::with_capacity(2);
        if !recorded.is_empty() {
            candidates.push(PathBuf::from(recorded));
        }
        let fallback = self.default_path(model_id);
        if !candidates.contains(&fallback) {
            candidates.push(fallback);
        }

        for path in &candidates {
            match Self::read(path) {
                Ok(artifact) => return Ok(artifact),
                Err(e) => {
                    tracing::warn!(
                        model_id = %model_id,
                        path = %path.display(),
                        error = %e,
                        "Skipping unusable artifact candidate"
                    );
                }
            }
        }

        Err(AppError::ArtifactNotFound(model_id.to_string()))
    }

    fn read(path: &Path) -> Result<TrainedArtifact> {
        let bytes = fs::read(path)?;
        let artifact: TrainedArtifact = bincode::deserialize(&bytes)?;
        if !artifact.matches_features() {
            return Err(AppError::IncompatibleModel(format!(
                "artifact expects features {:?}",
                artifact.feature_names
            )));
        }
        Ok(artifact)
    }

    /// Best-effort removal used when metadata could not be persisted
    pub fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned artifact");
        }
    }
}
