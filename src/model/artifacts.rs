use crate::model::{ModelMetadata, RobotDescription};
use snafu::{ResultExt, Snafu};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ARTIFACTS_ENV_VAR: &str = "ROBOSIM_ARTIFACTS";
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
const METADATA_FILE: &str = "metadata.json";
const DESCRIPTION_FILE: &str = "robot.json";

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum ArtifactError {
    #[snafu(display("Couldn't read artifact {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Artifact {} is malformed: {source}", path.display()))]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Directory of cached model artifacts, one sub-directory per model name.
///
/// ```text
/// <root>/<model>/metadata.json
/// <root>/<model>/robot.json
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactCache { root: root.into() }
    }

    /// Uses `$ROBOSIM_ARTIFACTS`, falling back to `./artifacts`
    pub fn from_env() -> Self {
        let root = std::env::var_os(ARTIFACTS_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.root.join(model)
    }

    pub fn metadata_path(&self, model: &str) -> PathBuf {
        self.model_dir(model).join(METADATA_FILE)
    }

    pub fn description_path(&self, model: &str) -> PathBuf {
        self.model_dir(model).join(DESCRIPTION_FILE)
    }

    pub fn load_metadata(&self, model: &str) -> Result<ModelMetadata, ArtifactError> {
        let path = self.metadata_path(model);
        let json = fs::read_to_string(&path).context(ReadErr { path: &path })?;
        debug!("Loaded model metadata from {}", path.display());
        ModelMetadata::from_json(&json).context(ParseErr { path })
    }

    pub fn load_description(&self, model: &str) -> Result<RobotDescription, ArtifactError> {
        let path = self.description_path(model);
        let json = fs::read_to_string(&path).context(ReadErr { path: &path })?;
        RobotDescription::from_json(&json).context(ParseErr { path })
    }
}
