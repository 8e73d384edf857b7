use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Survey configuration, read from a TOML file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Directory holding the batch CSV files
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    /// Directory for resumable per-tester progress records
    #[serde(default = "default_progress_dir")]
    pub progress_dir: PathBuf,
    /// Directory for final per-tester result tables
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Base directory that relative audio paths in batch files are resolved against
    #[serde(default)]
    pub audio_root: Option<PathBuf>,
}

fn default_dataset_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_progress_dir() -> PathBuf {
    PathBuf::from("progress")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_dir: default_dataset_dir(),
            progress_dir: default_progress_dir(),
            results_dir: default_results_dir(),
            audio_root: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Load `path` if given, otherwise start from defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
dataset_dir = "/srv/mos/batches"
progress_dir = "/srv/mos/progress"
results_dir = "/srv/mos/results"
audio_root = "/srv/mos/audio"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.dataset_dir, PathBuf::from("/srv/mos/batches"));
        assert_eq!(config.progress_dir, PathBuf::from("/srv/mos/progress"));
        assert_eq!(config.results_dir, PathBuf::from("/srv/mos/results"));
        assert_eq!(config.audio_root, Some(PathBuf::from("/srv/mos/audio")));
    }

    #[test]
    fn test_config_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "dataset_dir = \"batches\"\n").unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.dataset_dir, PathBuf::from("batches"));
        assert_eq!(config.progress_dir, PathBuf::from("progress"));
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.audio_root, None);
    }

    #[test]
    fn test_config_load_without_file() {
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }

    #[test]
    fn test_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "dataset_dir = [").unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/survey.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
