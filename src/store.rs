//! Directory-backed persistence for the trained predictors and the codec.
//!
//! Each artifact is a single `<name>.bin` file: a bincode-encoded envelope
//! carrying a magic tag, the format version and the artifact name, followed
//! by the payload.

use crate::error::PersistenceError;
use crate::features::FeatureCodec;
use crate::model::{Target, TrainedModel};
use crate::train::{TrainedModels, TrainingReport};
use bincode::config::Config;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const CODEC_ARTIFACT: &str = "feature_codec";
pub const REPORT_FILE: &str = "training_report.json";

const MAGIC: [u8; 4] = *b"EVBM";
const FORMAT_VERSION: u16 = 1;
const ARTIFACT_LIMIT: usize = 1 << 30;

fn config() -> impl Config {
    bincode::config::standard().with_limit::<ARTIFACT_LIMIT>()
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    magic: [u8; 4],
    version: u16,
    name: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    magic: [u8; 4],
    version: u16,
    name: String,
    payload: T,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.bin"))
    }

    /// Writes `value` under `name`, replacing any previous artifact.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let envelope = EnvelopeRef {
            magic: MAGIC,
            version: FORMAT_VERSION,
            name,
            payload: value,
        };
        let bytes = bincode::serde::encode_to_vec(&envelope, config()).map_err(|e| {
            PersistenceError::Encode {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let path = self.path_for(name);
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(name, bytes = bytes.len(), path = %path.display(), "artifact saved");
        Ok(path)
    }

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T, PersistenceError> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PersistenceError::ModelNotFound {
                    name: name.to_string(),
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| PersistenceError::CorruptArtifact {
            name: name.to_string(),
            reason,
        };
        let (envelope, read): (Envelope<T>, usize) =
            bincode::serde::decode_from_slice(&bytes, config()).map_err(|e| corrupt(e.to_string()))?;

        if envelope.magic != MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }
        if envelope.version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                envelope.version
            )));
        }
        if envelope.name != name {
            return Err(corrupt(format!("artifact is named '{}'", envelope.name)));
        }
        if read != bytes.len() {
            return Err(corrupt(format!(
                "{} trailing bytes",
                bytes.len() - read
            )));
        }
        Ok(envelope.payload)
    }

    pub fn save_model(&self, target: Target, model: &TrainedModel) -> Result<PathBuf, PersistenceError> {
        self.save(target.artifact_name(), model)
    }

    pub fn load_model(&self, target: Target) -> Result<TrainedModel, PersistenceError> {
        let model: TrainedModel = self.load(target.artifact_name())?;
        if model.is_classifier() != target.is_classification() {
            return Err(PersistenceError::CorruptArtifact {
                name: target.artifact_name().to_string(),
                reason: "model kind does not match target".to_string(),
            });
        }
        Ok(model)
    }

    pub fn save_codec(&self, codec: &FeatureCodec) -> Result<PathBuf, PersistenceError> {
        self.save(CODEC_ARTIFACT, codec)
    }

    pub fn load_codec(&self) -> Result<FeatureCodec, PersistenceError> {
        self.load(CODEC_ARTIFACT)
    }

    /// Persists the four models and the codec they were trained with.
    pub fn save_all(
        &self,
        models: &TrainedModels,
        codec: &FeatureCodec,
    ) -> Result<(), PersistenceError> {
        for target in Target::ALL {
            let path = self.save_model(target, models.get(target))?;
            tracing::info!(target_column = target.column(), path = %path.display(), "model saved");
        }
        self.save_codec(codec)?;
        Ok(())
    }

    pub fn save_report(&self, report: &TrainingReport) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(REPORT_FILE);
        let json = serde_json::to_vec_pretty(report).map_err(|e| PersistenceError::Encode {
            name: REPORT_FILE.to_string(),
            reason: e.to_string(),
        })?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureRecord, FEATURE_COUNT};
    use crate::model::{ForestParams, Predictor};
    use tempfile::TempDir;

    fn record(x: f64) -> FeatureRecord {
        FeatureRecord::from_values(std::array::from_fn(|i| x + i as f64 * 0.1))
    }

    fn regressor() -> TrainedModel {
        let x: Vec<FeatureRecord> = (0..30).map(|i| record(i as f64)).collect();
        let y: Vec<f64> = (0..30).map(|i| (i as f64).sqrt()).collect();
        TrainedModel::fit_regressor(Target::Usage, &x, &y, ForestParams { n_trees: 5, seed: 3 })
            .unwrap()
    }

    #[test]
    fn test_round_trip_preserves_predictions() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        let model = regressor();
        let inputs: Vec<FeatureRecord> = [0.5, 7.25, 19.0, 100.0].map(record).to_vec();
        let before = model.predict_batch(&inputs).unwrap();

        store.save_model(Target::Usage, &model).unwrap();
        let loaded = store.load_model(Target::Usage).unwrap();
        let after = loaded.predict_batch(&inputs).unwrap();
        assert_eq!(before, after);
        assert_eq!(inputs.len(), after.len());
        assert_eq!(inputs[0].values().len(), FEATURE_COUNT);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        match store.load_model(Target::Lifespan) {
            Err(PersistenceError::ModelNotFound { name, .. }) => {
                assert_eq!(name, "battery_lifespan_model")
            }
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        fs::write(store.path_for("battery_usage_model"), b"not a model").unwrap();
        assert!(matches!(
            store.load_model(Target::Usage),
            Err(PersistenceError::CorruptArtifact { .. })
        ));
    }

    #[test]
    fn test_renamed_artifact_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        store.save_model(Target::Usage, &regressor()).unwrap();
        fs::copy(
            store.path_for("battery_usage_model"),
            store.path_for("battery_degradation_model"),
        )
        .unwrap();
        assert!(matches!(
            store.load_model(Target::Degradation),
            Err(PersistenceError::CorruptArtifact { .. })
        ));
    }

    #[test]
    fn test_truncated_artifact_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        let path = store.save_model(Target::Usage, &regressor()).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(
            store.load_model(Target::Usage),
            Err(PersistenceError::CorruptArtifact { .. })
        ));
    }
}
