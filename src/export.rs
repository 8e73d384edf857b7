use crate::error::{Result, SurveyError};
use crate::models::{SessionState, TesterId};
use crate::store::write_atomically;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// One row of a tester's final result table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub filepath: String,
    pub model: String,
    #[serde(rename = "Natural-MOS")]
    pub naturalness: f64,
    #[serde(rename = "Intelligibility-MOS")]
    pub intelligibility: f64,
    #[serde(rename = "Similarity-MOS")]
    pub similarity: f64,
}

/// Full score table of a completed session
#[derive(Debug, Clone, PartialEq)]
pub struct ResultArtifact {
    pub tester_id: TesterId,
    pub rows: Vec<ResultRow>,
}

impl ResultArtifact {
    /// Build the table from a completed session, rows in batch order
    ///
    /// Returns `None` while any item is still unscored.
    pub fn from_session(state: &SessionState) -> Option<Self> {
        if state.submitted() != state.total() {
            return None;
        }
        let rows = state
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let ratings = state.scores.get(position)?;
                Some(ResultRow {
                    filepath: item.audio_path.clone(),
                    model: item.model_name.clone(),
                    naturalness: ratings.naturalness.value(),
                    intelligibility: ratings.intelligibility.value(),
                    similarity: ratings.similarity.value(),
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            tester_id: state.tester_id.clone(),
            rows,
        })
    }

    /// Render as CSV with a header line
    pub fn to_csv(&self) -> std::result::Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.rows.is_empty() {
            writer.write_record([
                "filepath",
                "model",
                "Natural-MOS",
                "Intelligibility-MOS",
                "Similarity-MOS",
            ])?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

/// Destination for final result tables
pub trait ResultExporter {
    /// Persist `artifact`, replacing any earlier export for the same tester
    fn export(&self, artifact: &ResultArtifact) -> Result<PathBuf>;
}

/// Writes `<dir>/<tester_id>.csv`, kept apart from progress records
#[derive(Debug, Clone)]
pub struct CsvResultExporter {
    dir: PathBuf,
}

impl CsvResultExporter {
    /// Create the exporter, making `dir` if it does not exist
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SurveyError::persistence("create results directory", &dir, e))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, tester_id: &TesterId) -> PathBuf {
        self.dir.join(format!("{}.csv", tester_id.as_str()))
    }
}

impl ResultExporter for CsvResultExporter {
    fn export(&self, artifact: &ResultArtifact) -> Result<PathBuf> {
        let path = self.path_for(&artifact.tester_id);
        let bytes = artifact
            .to_csv()
            .map_err(|e| SurveyError::persistence("serialize result table", &path, e))?;
        write_atomically(&self.dir, &path, &bytes, "write result table")?;
        info!(
            tester = %artifact.tester_id,
            rows = artifact.rows.len(),
            path = %path.display(),
            "exported results"
        );
        Ok(path)
    }
}
