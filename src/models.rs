use crate::error::{Result, SurveyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One synthesized utterance to be rated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleItem {
    /// Synthesized audio to rate
    pub audio_path: String,
    /// Reference voice the similarity axis is judged against
    pub reference_audio_path: String,
    /// Text that was synthesized
    pub transcript: String,
    /// System that produced the audio
    pub model_name: String,
    /// Raw `gt` value from the batch file
    pub ground_truth_id: String,
}

/// Ordered, fixed set of samples handed to a single tester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationBatch {
    /// Source file stem, kept for provenance
    pub name: String,
    pub items: Vec<SampleItem>,
}

impl EvaluationBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// A perceptual axis the tester rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Naturalness,
    Intelligibility,
    Similarity,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Naturalness, Axis::Intelligibility, Axis::Similarity];

    pub fn name(self) -> &'static str {
        match self {
            Axis::Naturalness => "naturalness",
            Axis::Intelligibility => "intelligibility",
            Axis::Similarity => "similarity",
        }
    }
}

/// Opinion score on the half-point scale from 1 to 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Score {
    One,
    OneHalf,
    Two,
    TwoHalf,
    Three,
    ThreeHalf,
    Four,
    FourHalf,
    Five,
}

impl Score {
    /// Every level, lowest first
    pub const ALL: [Score; 9] = [
        Score::One,
        Score::OneHalf,
        Score::Two,
        Score::TwoHalf,
        Score::Three,
        Score::ThreeHalf,
        Score::Four,
        Score::FourHalf,
        Score::Five,
    ];

    /// Numeric value as written to progress records and result tables
    pub fn value(self) -> f64 {
        // Levels are spaced by one half starting at 1.
        1.0 + 0.5 * self as u8 as f64
    }

    /// Label shown to testers
    pub fn label(self) -> &'static str {
        match self {
            Score::One => "1 - Bad",
            Score::OneHalf => "1.5",
            Score::Two => "2 - Poor",
            Score::TwoHalf => "2.5",
            Score::Three => "3 - Fair",
            Score::ThreeHalf => "3.5",
            Score::Four => "4 - Good",
            Score::FourHalf => "4.5",
            Score::Five => "5 - Excellent",
        }
    }

    pub fn from_value(value: f64) -> Option<Score> {
        Score::ALL.into_iter().find(|score| score.value() == value)
    }

    pub fn from_label(label: &str) -> Option<Score> {
        Score::ALL.into_iter().find(|score| score.label() == label)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Score {
    type Err = SurveyError;

    /// Accepts a full label ("4 - Good") or a bare number ("4", "4.5")
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(score) = Score::from_label(s) {
            return Ok(score);
        }
        s.parse::<f64>()
            .ok()
            .and_then(Score::from_value)
            .ok_or_else(|| SurveyError::InvalidScore(s.to_string()))
    }
}

impl TryFrom<f64> for Score {
    type Error = SurveyError;

    fn try_from(value: f64) -> Result<Self> {
        Score::from_value(value).ok_or_else(|| SurveyError::InvalidScore(value.to_string()))
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> f64 {
        score.value()
    }
}

/// Three scores committed for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    pub naturalness: Score,
    pub intelligibility: Score,
    pub similarity: Score,
}

impl Ratings {
    pub fn new(naturalness: Score, intelligibility: Score, similarity: Score) -> Self {
        Self {
            naturalness,
            intelligibility,
            similarity,
        }
    }
}

/// Selections as they stand in the form, any axis possibly unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingInput {
    pub naturalness: Option<Score>,
    pub intelligibility: Option<Score>,
    pub similarity: Option<Score>,
}

impl RatingInput {
    pub fn get(&self, axis: Axis) -> Option<Score> {
        match axis {
            Axis::Naturalness => self.naturalness,
            Axis::Intelligibility => self.intelligibility,
            Axis::Similarity => self.similarity,
        }
    }

    pub fn set(&mut self, axis: Axis, score: Option<Score>) {
        match axis {
            Axis::Naturalness => self.naturalness = score,
            Axis::Intelligibility => self.intelligibility = score,
            Axis::Similarity => self.similarity = score,
        }
    }

    /// Axes still waiting for a selection, in display order
    pub fn missing(&self) -> Vec<Axis> {
        Axis::ALL
            .into_iter()
            .filter(|axis| self.get(*axis).is_none())
            .collect()
    }

    /// True once submitting is allowed
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Converts to committed ratings or reports every unset axis
    pub fn complete(&self) -> Result<Ratings> {
        match (self.naturalness, self.intelligibility, self.similarity) {
            (Some(n), Some(i), Some(s)) => Ok(Ratings::new(n, i, s)),
            _ => Err(SurveyError::IncompleteRating {
                missing: self.missing(),
            }),
        }
    }
}

impl From<Ratings> for RatingInput {
    fn from(ratings: Ratings) -> Self {
        Self {
            naturalness: Some(ratings.naturalness),
            intelligibility: Some(ratings.intelligibility),
            similarity: Some(ratings.similarity),
        }
    }
}

/// Validated tester identity, also used as the storage key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TesterId(String);

impl TesterId {
    /// Trims surrounding whitespace, then requires a non-empty ASCII alphanumeric id
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(SurveyError::InvalidIdentity {
                id: raw.to_string(),
                reason: "id must not be empty",
            });
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SurveyError::InvalidIdentity {
                id: raw.to_string(),
                reason: "only alphanumeric characters are allowed",
            });
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TesterId {
    type Error = SurveyError;

    fn try_from(value: String) -> Result<Self> {
        TesterId::parse(&value)
    }
}

impl From<TesterId> for String {
    fn from(id: TesterId) -> String {
        id.0
    }
}

/// Committed scores, one entry per submitted item on each axis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub naturalness: Vec<Score>,
    pub intelligibility: Vec<Score>,
    pub similarity: Vec<Score>,
}

impl ScoreSheet {
    /// Number of items committed so far (the submission frontier)
    pub fn submitted(&self) -> usize {
        self.naturalness.len()
    }

    pub fn get(&self, position: usize) -> Option<Ratings> {
        Some(Ratings::new(
            *self.naturalness.get(position)?,
            *self.intelligibility.get(position)?,
            *self.similarity.get(position)?,
        ))
    }

    pub fn push(&mut self, ratings: Ratings) {
        self.naturalness.push(ratings.naturalness);
        self.intelligibility.push(ratings.intelligibility);
        self.similarity.push(ratings.similarity);
    }

    /// Overwrites an already committed position; returns false when out of range
    pub fn replace(&mut self, position: usize, ratings: Ratings) -> bool {
        if position >= self.submitted() {
            return false;
        }
        self.naturalness[position] = ratings.naturalness;
        self.intelligibility[position] = ratings.intelligibility;
        self.similarity[position] = ratings.similarity;
        true
    }

    fn is_aligned(&self) -> bool {
        self.naturalness.len() == self.intelligibility.len()
            && self.naturalness.len() == self.similarity.len()
    }
}

/// One tester's progress through their batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub tester_id: TesterId,
    /// Name of the batch the items were drawn from
    pub batch: String,
    pub items: Vec<SampleItem>,
    /// Viewing position, `items.len()` once finished
    pub cursor: usize,
    pub scores: ScoreSheet,
}

impl SessionState {
    /// Fresh session seeded from a claimed batch
    pub fn new(tester_id: TesterId, batch: &EvaluationBatch) -> Self {
        Self {
            tester_id,
            batch: batch.name.clone(),
            items: batch.items.clone(),
            cursor: 0,
            scores: ScoreSheet::default(),
        }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn submitted(&self) -> usize {
        self.scores.submitted()
    }

    pub fn current_item(&self) -> Option<&SampleItem> {
        self.items.get(self.cursor)
    }

    /// Scores previously committed at the cursor, if any
    pub fn recorded_at_cursor(&self) -> Option<Ratings> {
        self.scores.get(self.cursor)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == self.total() && self.submitted() == self.total()
    }

    /// Checks the structural invariants a persisted record must satisfy
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if !self.scores.is_aligned() {
            return Err(format!(
                "score sequences differ in length ({}, {}, {})",
                self.scores.naturalness.len(),
                self.scores.intelligibility.len(),
                self.scores.similarity.len()
            ));
        }
        if self.submitted() > self.total() {
            return Err(format!(
                "{} scores recorded for {} items",
                self.submitted(),
                self.total()
            ));
        }
        if self.cursor > self.submitted() {
            return Err(format!(
                "cursor {} is past the submission frontier {}",
                self.cursor,
                self.submitted()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> SampleItem {
        SampleItem {
            audio_path: format!("wav/{}.wav", n),
            reference_audio_path: format!("gt/{}.wav", n),
            transcript: format!("utterance {}", n),
            model_name: "vits".to_string(),
            ground_truth_id: format!("gt/{}.wav", n),
        }
    }

    #[test]
    fn test_score_label_value_mapping_is_total() {
        assert_eq!(Score::ALL.len(), 9);
        for score in Score::ALL {
            assert_eq!(Score::from_value(score.value()), Some(score));
            assert_eq!(Score::from_label(score.label()), Some(score));
        }
        assert_eq!(Score::One.value(), 1.0);
        assert_eq!(Score::TwoHalf.value(), 2.5);
        assert_eq!(Score::Five.value(), 5.0);
        assert_eq!(Score::Four.label(), "4 - Good");
        assert_eq!(Score::ThreeHalf.label(), "3.5");
    }

    #[test]
    fn test_score_parsing() {
        assert_eq!("5 - Excellent".parse::<Score>().unwrap(), Score::Five);
        assert_eq!("4.5".parse::<Score>().unwrap(), Score::FourHalf);
        assert_eq!(" 2 ".parse::<Score>().unwrap(), Score::Two);
        assert_eq!("2.0".parse::<Score>().unwrap(), Score::Two);
        assert!("0.5".parse::<Score>().is_err());
        assert!("4.25".parse::<Score>().is_err());
        assert!("good".parse::<Score>().is_err());
    }

    #[test]
    fn test_score_serializes_as_number() {
        let json = serde_json::to_string(&vec![Score::Four, Score::OneHalf]).unwrap();
        assert_eq!(json, "[4.0,1.5]");
        let back: Vec<Score> = serde_json::from_str("[3, 2.5]").unwrap();
        assert_eq!(back, vec![Score::Three, Score::TwoHalf]);
        assert!(serde_json::from_str::<Score>("6").is_err());
    }

    #[test]
    fn test_tester_id_validation() {
        assert_eq!(TesterId::parse("abc123").unwrap().as_str(), "abc123");
        assert_eq!(TesterId::parse("  abc123 ").unwrap().as_str(), "abc123");
        assert!(TesterId::parse("").is_err());
        assert!(TesterId::parse("   ").is_err());
        assert!(TesterId::parse("abc 123").is_err());
        assert!(TesterId::parse("../etc").is_err());
        assert!(TesterId::parse("tëster").is_err());
    }

    #[test]
    fn test_rating_input_reports_each_missing_axis() {
        let mut input = RatingInput::default();
        assert_eq!(input.missing(), Axis::ALL.to_vec());
        input.set(Axis::Intelligibility, Some(Score::Three));
        assert!(!input.is_complete());
        match input.complete() {
            Err(SurveyError::IncompleteRating { missing }) => {
                assert_eq!(missing, vec![Axis::Naturalness, Axis::Similarity]);
            }
            other => panic!("expected incomplete rating, got {:?}", other),
        }
        input.set(Axis::Naturalness, Some(Score::Four));
        input.set(Axis::Similarity, Some(Score::Five));
        assert_eq!(
            input.complete().unwrap(),
            Ratings::new(Score::Four, Score::Three, Score::Five)
        );
    }

    #[test]
    fn test_score_sheet_replace_only_within_frontier() {
        let mut sheet = ScoreSheet::default();
        let low = Ratings::new(Score::One, Score::One, Score::One);
        let high = Ratings::new(Score::Five, Score::Five, Score::Five);
        sheet.push(low);
        assert!(!sheet.replace(1, high));
        assert!(sheet.replace(0, high));
        assert_eq!(sheet.get(0), Some(high));
        assert_eq!(sheet.submitted(), 1);
    }

    #[test]
    fn test_session_invariants() {
        let batch = EvaluationBatch {
            name: "batch0".to_string(),
            items: vec![sample(0), sample(1)],
        };
        let id = TesterId::parse("abc").unwrap();
        let mut state = SessionState::new(id, &batch);
        assert!(state.check_invariants().is_ok());
        assert_eq!(state.current_item(), Some(&batch.items[0]));

        state.cursor = 1;
        assert!(state.check_invariants().is_err());

        state.cursor = 0;
        state.scores.naturalness.push(Score::Three);
        assert!(state.check_invariants().is_err());
    }
}
