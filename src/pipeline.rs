use crate::config::TrainConfig;
use crate::dataset::{self, RawDataset, TrainingTable};
use crate::error::Result;
use crate::store::ModelStore;
use crate::train::{Trainer, TrainingReport};

/// Raw CSV -> processed CSV -> four models + codec in the model directory.
///
/// The trainer reads the processed file back, so what is trained on is
/// exactly what was written.
pub fn run_training(cfg: &TrainConfig) -> Result<TrainingReport> {
    tracing::info!(path = %cfg.raw_dataset.display(), "loading raw dataset");
    let raw = RawDataset::from_path(&cfg.raw_dataset)?;
    let prepared = dataset::prepare(&raw)?;

    prepared.table.to_path(&cfg.processed_dataset)?;
    tracing::info!(path = %cfg.processed_dataset.display(), "dataset preprocessed and saved");

    let table = TrainingTable::from_path(&cfg.processed_dataset)?;
    let trainer = Trainer::new(cfg.trainer_options());
    let (models, report) = trainer.train(&table)?;

    let store = ModelStore::new(&cfg.model_dir);
    store.save_all(&models, &prepared.codec)?;
    let report_path = store.save_report(&report)?;
    tracing::info!(path = %report_path.display(), "training report written");
    Ok(report)
}
