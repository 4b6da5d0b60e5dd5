use crate::error::{Error, Result};
use crate::train::TrainerOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 5000;

/// Serving settings, read from `MODEL_DIR`, `BIND_ADDR` and `PORT`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServeConfig {
    pub model_dir: PathBuf,
    pub bind_addr: IpAddr,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

impl ServeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(dir) = lookup("MODEL_DIR") {
            cfg.model_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            match addr.parse() {
                Ok(a) => cfg.bind_addr = a,
                Err(_) => tracing::warn!("invalid BIND_ADDR {:?}; using {}", addr, cfg.bind_addr),
            }
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(p) => cfg.port = p,
                Err(_) => tracing::warn!("invalid PORT {:?}; using {}", port, cfg.port),
            }
        }
        cfg
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

/// Offline pipeline settings. Loaded from the JSON file named by
/// `TRAIN_CONFIG` when set; path variables override the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub raw_dataset: PathBuf,
    pub processed_dataset: PathBuf,
    pub model_dir: PathBuf,
    pub test_fraction: f64,
    pub seed: u64,
    pub n_trees: u16,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let options = TrainerOptions::default();
        Self {
            raw_dataset: PathBuf::from("ev-battery-health-100-samples.csv"),
            processed_dataset: PathBuf::from("processed_data.csv"),
            model_dir: PathBuf::from("models"),
            test_fraction: options.test_fraction,
            seed: options.seed,
            n_trees: options.n_trees,
        }
    }
}

impl TrainConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("TRAIN_CONFIG") {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(p) = lookup("RAW_DATASET") {
            cfg.raw_dataset = PathBuf::from(p);
        }
        if let Some(p) = lookup("PROCESSED_DATASET") {
            cfg.processed_dataset = PathBuf::from(p);
        }
        if let Some(p) = lookup("MODEL_DIR") {
            cfg.model_dir = PathBuf::from(p);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(Error::Config(format!(
                "test_fraction must be between 0 and 1, got {}",
                self.test_fraction
            )));
        }
        if self.n_trees == 0 {
            return Err(Error::Config("n_trees must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn trainer_options(&self) -> TrainerOptions {
        TrainerOptions {
            test_fraction: self.test_fraction,
            seed: self.seed,
            n_trees: self.n_trees,
        }
    }
}
