use crate::dataset::BatchPool;
use crate::error::{Result, SurveyError};
use crate::export::{ResultArtifact, ResultExporter};
use crate::models::{RatingInput, Ratings, SampleItem, SessionState, TesterId};
use crate::store::ProgressStore;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Which navigation actions the presentation layer should enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NavFlags {
    /// Some earlier item exists
    pub back: bool,
    /// A previously submitted item lies ahead of the cursor
    pub forward: bool,
}

/// What to show after a transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub tester_id: TesterId,
    /// Zero-based index of the item on screen; `total` once finished
    pub cursor: usize,
    pub total: usize,
    /// Item at the cursor, `None` once every item is scored and the cursor sits at the end
    pub item: Option<SampleItem>,
    /// Scores to pre-fill when revisiting a submitted item
    pub prefilled: Option<Ratings>,
    pub nav: NavFlags,
    pub completed: bool,
}

impl View {
    fn of(state: &SessionState) -> Self {
        Self {
            tester_id: state.tester_id.clone(),
            cursor: state.cursor,
            total: state.total(),
            item: state.current_item().cloned(),
            prefilled: state.recorded_at_cursor(),
            nav: NavFlags {
                back: state.cursor > 0,
                forward: state.cursor < state.submitted(),
            },
            completed: state.is_complete(),
        }
    }
}

/// New session state together with its view
#[derive(Debug, Clone)]
pub struct Step {
    pub state: SessionState,
    pub view: View,
    /// Set when this step completed the session and wrote its result table
    pub exported: Option<PathBuf>,
}

impl Step {
    fn settled(state: SessionState) -> Self {
        Self {
            view: View::of(&state),
            state,
            exported: None,
        }
    }
}

/// Outcome of `register`
#[derive(Debug, Clone)]
pub struct Registration {
    pub step: Step,
    /// True when an earlier session for this id was picked up
    pub resumed: bool,
}

/// Drives one tester's session: registration, submission and completion
pub struct EvaluationMachine<S, X> {
    pool: BatchPool,
    store: S,
    exporter: X,
}

impl<S: ProgressStore, X: ResultExporter> EvaluationMachine<S, X> {
    pub fn new(pool: BatchPool, store: S, exporter: X) -> Self {
        Self {
            pool,
            store,
            exporter,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resume the stored session for `raw_id`, or start one on the next batch
    pub fn register(&self, raw_id: &str) -> Result<Registration> {
        let tester_id = TesterId::parse(raw_id)?;

        if let Some(state) = self.store.load(&tester_id)? {
            info!(
                tester = %tester_id,
                cursor = state.cursor,
                submitted = state.submitted(),
                total = state.total(),
                "resumed session"
            );
            return Ok(Registration {
                step: Step::settled(state),
                resumed: true,
            });
        }

        let batch = self.pool.claim_next();
        let state = SessionState::new(tester_id, &batch);
        self.store.save(&state)?;
        info!(
            tester = %state.tester_id,
            batch = %state.batch,
            total = state.total(),
            "started session"
        );

        Ok(Registration {
            step: Step::settled(state),
            resumed: false,
        })
    }

    /// Commit ratings for the item at the cursor and move forward
    ///
    /// On a revisited item the stored scores are overwritten; at the frontier
    /// they are appended. The new state is saved before returning. When the
    /// last item gets its scores the result table is written first, so a
    /// failed export leaves the stored progress at the previous step. On error
    /// the caller's state is untouched and the submit can be retried.
    pub fn submit(&self, state: &SessionState, input: RatingInput) -> Result<Step> {
        if state.cursor >= state.total() {
            return Err(SurveyError::SessionFinished {
                tester_id: state.tester_id.to_string(),
            });
        }

        let ratings = input.complete().inspect_err(|err| {
            warn!(
                tester = %state.tester_id,
                position = state.cursor,
                %err,
                "rejected submission"
            );
        })?;

        let mut next = state.clone();
        if next.cursor < next.submitted() {
            next.scores.replace(next.cursor, ratings);
            debug!(tester = %next.tester_id, position = next.cursor, "overwrote scores");
        } else {
            next.scores.push(ratings);
            debug!(tester = %next.tester_id, position = next.cursor, "appended scores");
        }
        next.cursor += 1;

        let exported = match ResultArtifact::from_session(&next) {
            Some(artifact) if next.is_complete() => Some(self.exporter.export(&artifact)?),
            _ => None,
        };
        self.store.save(&next)?;

        if exported.is_some() {
            info!(tester = %next.tester_id, total = next.total(), "evaluation finished");
        }

        let mut view = View::of(&next);
        // The form starts blank after a submit, even on a revisited item.
        view.prefilled = None;

        Ok(Step {
            state: next,
            view,
            exported,
        })
    }
}

/// Step one item back; a no-op at the first item
///
/// Navigation is not persisted.
pub fn go_back(state: &SessionState) -> Step {
    let mut next = state.clone();
    if next.cursor > 0 {
        next.cursor -= 1;
    }
    debug!(tester = %next.tester_id, position = next.cursor, "moved back");
    Step::settled(next)
}

/// Step one item forward, only within already submitted items
pub fn go_next(state: &SessionState) -> Step {
    let mut next = state.clone();
    if next.cursor < next.submitted() {
        next.cursor += 1;
    }
    debug!(tester = %next.tester_id, position = next.cursor, "moved forward");
    Step::settled(next)
}

/// View for an existing state without moving
pub fn current_view(state: &SessionState) -> View {
    View::of(state)
}
