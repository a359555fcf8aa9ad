use clap::Args;
use std::path::{Path, PathBuf};
use thiserror::Error;
use twotone_core::{DecodeConfig, ToneDecodeError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Invalid(#[from] ToneDecodeError),
}

/// Decode settings shared by every subcommand that decodes audio
#[derive(Debug, Clone, Default, Args)]
pub struct DecodeArgs {
    /// TOML file with decode settings; omitted keys keep their defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Max deviation in Hz between a detected tone and a table entry
    #[arg(long, value_name = "HZ")]
    pub tolerance: Option<f64>,

    /// Lower edge of the frequency search band in Hz
    #[arg(long, value_name = "HZ")]
    pub band_lo: Option<f64>,

    /// Upper edge of the frequency search band in Hz
    #[arg(long, value_name = "HZ")]
    pub band_hi: Option<f64>,
}

impl DecodeArgs {
    /// Defaults, then the config file, then flags; the result is validated
    pub fn load(&self) -> Result<DecodeConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_file(path)?,
            None => DecodeConfig::default(),
        };

        if let Some(tolerance) = self.tolerance {
            config.tolerance_hz = tolerance;
        }
        if let Some(lo) = self.band_lo {
            config.band_lo_hz = lo;
        }
        if let Some(hi) = self.band_hi {
            config.band_hi_hz = hi;
        }

        config.validate()?;
        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<DecodeConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(text: &str) -> Result<DecodeConfig, toml::de::Error> {
    toml::from_str(text)
}
