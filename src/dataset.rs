use crate::error::{Result, SurveyError};
use crate::models::{EvaluationBatch, SampleItem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

const REQUIRED_COLUMNS: [&str; 4] = ["filepath", "transcript", "model", "gt"];

/// Fixed pool of batches handed out round-robin to new testers
///
/// The claim counter lives only as long as the process; a restart starts
/// again from the first batch.
#[derive(Debug)]
pub struct BatchPool {
    batches: Vec<Arc<EvaluationBatch>>,
    next: AtomicUsize,
}

impl BatchPool {
    /// Build a pool from already loaded batches
    ///
    /// Every batch must hold at least one sample.
    pub fn new(batches: Vec<EvaluationBatch>) -> Result<Self> {
        if batches.is_empty() {
            return Err(SurveyError::dataset(PathBuf::new(), "no evaluation batches"));
        }
        if let Some(empty) = batches.iter().find(|batch| batch.items.is_empty()) {
            return Err(SurveyError::dataset(
                PathBuf::from(&empty.name),
                "batch contains no samples",
            ));
        }
        Ok(Self {
            batches: batches.into_iter().map(Arc::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    /// Load every `*.csv` file in `dir`, sorted by file name, one batch per file
    ///
    /// Relative `filepath` and `gt` values are joined onto `audio_root` when given.
    pub fn load(dir: &Path, audio_root: Option<&Path>) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| SurveyError::dataset(dir, format!("cannot read directory: {}", e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| SurveyError::dataset(dir, format!("cannot list directory: {}", e)))?
                .path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if path.is_file() && is_csv {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(SurveyError::dataset(dir, "no .csv batch files found"));
        }

        let batches = paths
            .iter()
            .map(|path| load_batch(path, audio_root))
            .collect::<Result<Vec<_>>>()?;

        let pool = Self::new(batches)?;
        info!(
            dir = %dir.display(),
            batches = pool.len(),
            "loaded evaluation batches"
        );
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Next batch in round-robin order, wrapping after the last one
    ///
    /// The counter is atomic, so concurrent claims never observe the same
    /// slot twice within one cycle.
    pub fn claim_next(&self) -> Arc<EvaluationBatch> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.batches.len();
        let batch = Arc::clone(&self.batches[slot]);
        debug!(slot, batch = %batch.name, samples = batch.len(), "claimed batch");
        batch
    }
}

/// Parse one batch file; every required column must be present
pub fn load_batch(path: &Path, audio_root: Option<&Path>) -> Result<EvaluationBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| SurveyError::dataset(path, e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| SurveyError::dataset(path, e.to_string()))?
        .clone();

    let mut columns = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, name) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SurveyError::dataset(path, format!("missing column `{}`", name)))?;
    }
    let [filepath, transcript, model, gt] = columns;

    let mut items = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| SurveyError::dataset(path, e.to_string()))?;
        // Header is line 1.
        let field = |idx: usize| {
            record.get(idx).map(str::to_string).ok_or_else(|| {
                SurveyError::dataset(path, format!("line {}: too few fields", row + 2))
            })
        };
        let ground_truth_id = field(gt)?;
        items.push(SampleItem {
            audio_path: resolve(audio_root, &field(filepath)?),
            reference_audio_path: resolve(audio_root, &ground_truth_id),
            transcript: field(transcript)?,
            model_name: field(model)?,
            ground_truth_id,
        });
    }

    if items.is_empty() {
        return Err(SurveyError::dataset(path, "batch contains no samples"));
    }

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!(batch = %name, samples = items.len(), "parsed batch file");

    Ok(EvaluationBatch { name, items })
}

fn resolve(audio_root: Option<&Path>, value: &str) -> String {
    match audio_root {
        Some(root) if Path::new(value).is_relative() => {
            root.join(value).to_string_lossy().into_owned()
        }
        _ => value.to_string(),
    }
}
