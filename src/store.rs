use crate::error::{Result, SurveyError};
use crate::models::{SessionState, TesterId};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Durable, per-tester storage of session progress
///
/// Single writer per key: two processes saving the same tester race and the
/// last write wins.
pub trait ProgressStore {
    /// Replace whatever is stored for `state.tester_id`
    fn save(&self, state: &SessionState) -> Result<()>;

    /// Stored session for `tester_id`, `None` if the tester is new
    fn load(&self, tester_id: &TesterId) -> Result<Option<SessionState>>;
}

/// One pretty-printed JSON file per tester inside a directory
#[derive(Debug, Clone)]
pub struct JsonProgressStore {
    dir: PathBuf,
}

impl JsonProgressStore {
    /// Create the store, making `dir` if it does not exist
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SurveyError::persistence("create progress directory", &dir, e))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, tester_id: &TesterId) -> PathBuf {
        self.dir.join(format!("{}.json", tester_id.as_str()))
    }
}

impl ProgressStore for JsonProgressStore {
    fn save(&self, state: &SessionState) -> Result<()> {
        let path = self.path_for(&state.tester_id);
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| SurveyError::persistence("serialize progress record", &path, e))?;
        write_atomically(&self.dir, &path, &json, "write progress record")?;
        debug!(
            tester = %state.tester_id,
            cursor = state.cursor,
            path = %path.display(),
            "saved progress"
        );
        Ok(())
    }

    fn load(&self, tester_id: &TesterId) -> Result<Option<SessionState>> {
        let path = self.path_for(tester_id);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SurveyError::persistence("read progress record", &path, e)),
        };

        let state: SessionState = serde_json::from_slice(&content)
            .map_err(|e| SurveyError::persistence("parse progress record", &path, e))?;

        if &state.tester_id != tester_id {
            return Err(SurveyError::persistence(
                "validate progress record",
                &path,
                format!("record belongs to tester {}", state.tester_id),
            ));
        }
        state
            .check_invariants()
            .map_err(|reason| SurveyError::persistence("validate progress record", &path, reason))?;

        Ok(Some(state))
    }
}

/// Write `bytes` to a temp file beside `path`, then rename it into place
///
/// Readers see either the previous content or the new one, never a prefix.
pub(crate) fn write_atomically(
    dir: &Path,
    path: &Path,
    bytes: &[u8],
    action: &'static str,
) -> Result<()> {
    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|e| SurveyError::persistence(action, path, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| SurveyError::persistence(action, path, e))?;
    tmp.persist(path)
        .map_err(|e| SurveyError::persistence(action, path, e.error))?;
    Ok(())
}
