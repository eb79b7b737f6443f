use crate::error::{PulseError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "pulse.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub gold: GoldConfig,
    pub thresholds: Thresholds,
    pub classifier: ClassifierConfig,
    pub ingest: IngestConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoldConfig {
    /// Trailing evaluation window length in days
    pub window_days: u32,
    /// Districts with fewer days of enrolment data are reported as insufficient
    pub min_observations: usize,
}

impl Default for GoldConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            min_observations: 7,
        }
    }
}

/// Classification thresholds. Every comparison is strict: a value equal to its threshold does not trigger.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub ovs_camp: f64,
    pub mii_hotspot: f64,
    pub mii_birth_rate: f64,
    pub dhr_high_risk: f64,
    pub tlp_weekend: f64,
    pub tlp_school_drive: f64,
    /// Volume guards: below these totals a flag is not raised. Zero disables a guard.
    /// Camp needs window enrolment, hotspot needs window enrolment, high risk needs
    /// enrolment plus updates.
    pub min_volume_camp_flag: u64,
    pub min_enrolment_migration_flag: u64,
    pub min_transactions_fraud_flag: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ovs_camp: 4.0,
            mii_hotspot: 0.40,
            mii_birth_rate: 0.05,
            dhr_high_risk: 1.5,
            tlp_weekend: 0.60,
            tlp_school_drive: 0.60,
            min_volume_camp_flag: 0,
            min_enrolment_migration_flag: 0,
            min_transactions_fraud_flag: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub k: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            k: 3,
            seed: 42,
            n_init: 10,
            max_iter: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_reported_rejections: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_reported_rejections: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for the snapshot archive; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    pub max_commit_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_commit_retries: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            file_prefix: "pulse.log".to_string(),
        }
    }
}

impl PulseConfig {
    /// Load `pulse.toml` if present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PulseError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PulseConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("PULSE_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(dir) = std::env::var("PULSE_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
        if let Some(days) = env_number("PULSE_WINDOW_DAYS")? {
            self.gold.window_days = days;
        }
        if let Some(min) = env_number("PULSE_MIN_OBSERVATIONS")? {
            self.gold.min_observations = min;
        }
        if let Some(seed) = env_number("PULSE_CLASSIFIER_SEED")? {
            self.classifier.seed = seed;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.gold.window_days == 0 {
            return Err(PulseError::Config("gold.window_days must be positive".to_string()));
        }
        if self.gold.min_observations == 0 {
            return Err(PulseError::Config("gold.min_observations must be positive".to_string()));
        }
        if self.classifier.k == 0 || self.classifier.n_init == 0 {
            return Err(PulseError::Config(
                "classifier.k and classifier.n_init must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PulseError::Config(format!("{} must be a number, got '{}'", name, raw))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_published_thresholds() {
        let config = PulseConfig::default();
        assert_eq!(config.gold.window_days, 90);
        assert_eq!(config.gold.min_observations, 7);
        assert_eq!(config.thresholds.ovs_camp, 4.0);
        assert_eq!(config.thresholds.mii_hotspot, 0.40);
        assert_eq!(config.thresholds.dhr_high_risk, 1.5);
        assert_eq!(config.classifier.k, 3);
        assert_eq!(config.classifier.seed, 42);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = PulseConfig::from_toml_str(
            r#"
            [gold]
            window_days = 30

            [classifier]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.gold.window_days, 30);
        assert_eq!(config.gold.min_observations, 7);
        assert_eq!(config.classifier.seed, 7);
        assert_eq!(config.classifier.n_init, 10);
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let err = PulseConfig::from_toml_str("[gold]\nwindow_days = 0\n").unwrap_err();
        assert!(matches!(err, PulseError::Config(_)));
    }
}
