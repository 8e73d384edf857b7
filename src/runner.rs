use crate::error::SurveyError;
use crate::export::ResultExporter;
use crate::machine::{self, EvaluationMachine, Step};
use crate::models::{Axis, RatingInput, Score, SessionState};
use crate::output::{self, Notice, OutputFormat};
use crate::store::ProgressStore;
use anyhow::{Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::info;

const HELP: &str = "\
Commands:
  n <score>            rate naturalness (use - to clear)
  i <score>            rate intelligibility
  s <score>            rate similarity
  rate <n> <i> <s>     set all three at once
  submit               commit the ratings and move on
  back | next          review earlier answers
  show                 print the current sample again
  scale                list the rating levels
  help                 this text
  quit                 leave; progress is kept
Scores are 1 to 5 in steps of 0.5, e.g. `rate 4 4.5 3`.";

/// A line typed by the tester
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Select(Axis, Option<Score>),
    SelectAll([Option<Score>; 3]),
    Submit,
    Back,
    Next,
    Show,
    Scale,
    Help,
    Quit,
}

fn parse_selection(token: &str) -> std::result::Result<Option<Score>, SurveyError> {
    match token {
        "-" | "_" => Ok(None),
        _ => token.parse().map(Some),
    }
}

fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(Command::Show);
    };
    let args: Vec<&str> = words.collect();

    let axis = match head {
        "n" | "naturalness" => Some(Axis::Naturalness),
        "i" | "intelligibility" => Some(Axis::Intelligibility),
        "s" | "similarity" => Some(Axis::Similarity),
        _ => None,
    };
    if let Some(axis) = axis {
        // Labels contain spaces ("4 - Good"), so rejoin the rest of the line.
        let value = args.join(" ");
        if value.is_empty() {
            return Err(format!("usage: {} <score>", head));
        }
        return parse_selection(&value)
            .map(|score| Command::Select(axis, score))
            .map_err(|e| e.to_string());
    }

    let command = match head {
        "rate" => {
            let [n, i, s] = args[..] else {
                return Err("usage: rate <naturalness> <intelligibility> <similarity>".to_string());
            };
            let mut scores = [None; 3];
            for (slot, token) in scores.iter_mut().zip([n, i, s]) {
                *slot = parse_selection(token).map_err(|e| e.to_string())?;
            }
            Command::SelectAll(scores)
        }
        "submit" => Command::Submit,
        "back" | "b" => Command::Back,
        "next" => Command::Next,
        "show" => Command::Show,
        "scale" => Command::Scale,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command `{}`; type `help`", other)),
    };
    Ok(command)
}

/// Terminal front end that feeds tester input into the evaluation machine
pub struct Runner<S, X> {
    machine: EvaluationMachine<S, X>,
    format: OutputFormat,
}

impl<S: ProgressStore, X: ResultExporter> Runner<S, X> {
    /// Create a new runner around a machine
    pub fn new(machine: EvaluationMachine<S, X>, format: OutputFormat) -> Self {
        Self { machine, format }
    }

    /// Run one tester's session until `quit` or end of input
    ///
    /// Returns the last session state, or `None` if no id was ever accepted.
    pub async fn run<R, W>(
        &self,
        input: R,
        out: &mut W,
        tester: Option<String>,
    ) -> Result<Option<SessionState>>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        let Some(step) = self.identify(&mut lines, out, tester).await? else {
            return Ok(None);
        };
        let mut state = step.state;
        let mut draft = RatingInput::default();

        while let Some(line) = lines.next_line().await.context("Failed to read input")? {
            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(message) => {
                    self.notice(out, Notice::Warning, &message)?;
                    continue;
                }
            };

            match command {
                Command::Select(axis, score) => {
                    draft.set(axis, score);
                    self.show(out, &state, &draft)?;
                }
                Command::SelectAll([n, i, s]) => {
                    draft = RatingInput {
                        naturalness: n,
                        intelligibility: i,
                        similarity: s,
                    };
                    self.show(out, &state, &draft)?;
                }
                Command::Submit => match self.machine.submit(&state, draft) {
                    Ok(step) => {
                        draft = RatingInput::default();
                        if let Some(path) = &step.exported {
                            self.notice(
                                out,
                                Notice::Success,
                                "Thank you for your feedback! Evaluation finished.",
                            )?;
                            self.notice(
                                out,
                                Notice::Info,
                                &format!("Results saved to {}", path.display()),
                            )?;
                        }
                        state = step.state;
                        self.show(out, &state, &draft)?;
                    }
                    Err(SurveyError::IncompleteRating { missing }) => {
                        for axis in missing {
                            let message = format!(
                                "Please rate {} before submitting.",
                                axis.name().to_uppercase()
                            );
                            self.notice(out, Notice::Warning, &message)?;
                        }
                    }
                    Err(err) if err.is_recoverable() => {
                        self.notice(out, Notice::Warning, &err.to_string())?;
                    }
                    Err(err) => return Err(err).context("Failed to record submission"),
                },
                Command::Back => {
                    (state, draft) = self.navigate(out, machine::go_back(&state))?;
                }
                Command::Next => {
                    (state, draft) = self.navigate(out, machine::go_next(&state))?;
                }
                Command::Show => self.show(out, &state, &draft)?,
                Command::Scale => self.write(out, &output::render_scale(self.format))?,
                Command::Help => self.notice(out, Notice::Info, HELP)?,
                Command::Quit => break,
            }
        }

        info!(tester = %state.tester_id, cursor = state.cursor, "session closed");
        Ok(Some(state))
    }

    /// Ask for an id until one is accepted or input ends
    async fn identify<R, W>(
        &self,
        lines: &mut Lines<R>,
        out: &mut W,
        mut candidate: Option<String>,
    ) -> Result<Option<Step>>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        loop {
            let raw = match candidate.take() {
                Some(raw) => raw,
                None => {
                    if self.format == OutputFormat::Plain {
                        self.write(out, "Enter your ID: ")?;
                        out.flush().context("Failed to write output")?;
                    }
                    match lines.next_line().await.context("Failed to read input")? {
                        Some(line) => line,
                        None => return Ok(None),
                    }
                }
            };

            match self.machine.register(&raw) {
                Ok(registration) => {
                    let step = registration.step;
                    let greeting = if registration.resumed {
                        format!("Welcome back! Your ID: {}", step.state.tester_id)
                    } else {
                        format!("Your ID: {}", step.state.tester_id)
                    };
                    self.notice(out, Notice::Info, &greeting)?;
                    let draft = step.view.prefilled.map(RatingInput::from).unwrap_or_default();
                    self.show(out, &step.state, &draft)?;
                    return Ok(Some(step));
                }
                Err(err) if err.is_recoverable() => {
                    self.notice(out, Notice::Warning, &err.to_string())?;
                }
                Err(err) => return Err(err).context("Failed to register tester"),
            }
        }
    }

    fn navigate<W: Write>(&self, out: &mut W, step: Step) -> Result<(SessionState, RatingInput)> {
        let draft = step.view.prefilled.map(RatingInput::from).unwrap_or_default();
        self.write(out, &output::render_view(&step.view, &draft, self.format))?;
        Ok((step.state, draft))
    }

    fn show<W: Write>(&self, out: &mut W, state: &SessionState, draft: &RatingInput) -> Result<()> {
        let view = machine::current_view(state);
        self.write(out, &output::render_view(&view, draft, self.format))
    }

    fn notice<W: Write>(&self, out: &mut W, notice: Notice, message: &str) -> Result<()> {
        self.write(out, &output::render_notice(notice, message, self.format))
    }

    fn write<W: Write>(&self, out: &mut W, text: &str) -> Result<()> {
        out.write_all(text.as_bytes())
            .context("Failed to write output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::BatchPool;
    use crate::export::CsvResultExporter;
    use crate::models::{EvaluationBatch, SampleItem, TesterId};
    use crate::store::JsonProgressStore;
    use std::path::Path;
    use tempfile::tempdir;

    fn create_runner(root: &Path, format: OutputFormat) -> TestRunner {
        let batch = EvaluationBatch {
            name: "batch0".to_string(),
            items: (0..2)
                .map(|n| SampleItem {
                    audio_path: format!("syn/{}.wav", n),
                    reference_audio_path: format!("ref/{}.wav", n),
                    transcript: format!("line {}", n),
                    model_name: "vits".to_string(),
                    ground_truth_id: format!("ref/{}.wav", n),
                })
                .collect(),
        };
        let machine = EvaluationMachine::new(
            BatchPool::new(vec![batch]).unwrap(),
            JsonProgressStore::new(root.join("progress")).unwrap(),
            CsvResultExporter::new(root.join("results")).unwrap(),
        );
        Runner::new(machine, format)
    }

    type TestRunner = Runner<JsonProgressStore, CsvResultExporter>;

    async fn drive(
        runner: &TestRunner,
        script: &str,
        tester: Option<&str>,
    ) -> (Option<SessionState>, String) {
        let mut out = Vec::new();
        let state = runner
            .run(script.as_bytes(), &mut out, tester.map(str::to_string))
            .await
            .unwrap();
        (state, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_parse_command_variants() {
        assert_eq!(
            parse_command("n 4.5"),
            Ok(Command::Select(Axis::Naturalness, Some(Score::FourHalf)))
        );
        assert_eq!(
            parse_command("similarity 5 - Excellent"),
            Ok(Command::Select(Axis::Similarity, Some(Score::Five)))
        );
        assert_eq!(
            parse_command("i -"),
            Ok(Command::Select(Axis::Intelligibility, None))
        );
        assert_eq!(
            parse_command("rate 4 _ 3"),
            Ok(Command::SelectAll([Some(Score::Four), None, Some(Score::Three)]))
        );
        assert_eq!(parse_command("  "), Ok(Command::Show));
        assert_eq!(parse_command("back"), Ok(Command::Back));
        assert_eq!(parse_command("q"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_command_errors() {
        assert!(parse_command("n").is_err());
        assert!(parse_command("n 7").is_err());
        assert!(parse_command("rate 1 2").is_err());
        assert!(parse_command("dance").unwrap_err().contains("unknown command"));
    }

    #[tokio::test]
    async fn test_run_without_input_returns_none() {
        let dir = tempdir().unwrap();
        let runner = create_runner(dir.path(), OutputFormat::Plain);
        let (state, out) = drive(&runner, "", None).await;
        assert!(state.is_none());
        assert!(out.contains("Enter your ID"));
    }

    #[tokio::test]
    async fn test_run_reprompts_for_invalid_id() {
        let dir = tempdir().unwrap();
        let runner = create_runner(dir.path(), OutputFormat::Plain);
        let (state, out) = drive(&runner, "bad id!\nabc123\nquit\n", None).await;

        assert!(out.contains("only alphanumeric characters are allowed"));
        assert!(out.contains("Your ID: abc123"));
        assert_eq!(state.unwrap().tester_id, TesterId::parse("abc123").unwrap());
    }

    #[tokio::test]
    async fn test_run_warns_for_each_missing_axis_and_keeps_draft() {
        let dir = tempdir().unwrap();
        let runner = create_runner(dir.path(), OutputFormat::Plain);
        let script = "i 3\nsubmit\nn 4\ns 2\nsubmit\n";
        let (state, out) = drive(&runner, script, Some("abc")).await;

        assert!(out.contains("Please rate NATURALNESS before submitting."));
        assert!(out.contains("Please rate SIMILARITY before submitting."));
        assert!(!out.contains("Please rate INTELLIGIBILITY"));

        let state = state.unwrap();
        assert_eq!(state.cursor, 1);
        assert_eq!(state.scores.intelligibility, vec![Score::Three]);
    }

    #[tokio::test]
    async fn test_run_full_session_exports_results() {
        let dir = tempdir().unwrap();
        let runner = create_runner(dir.path(), OutputFormat::Plain);
        let script = "rate 4 5 3\nsubmit\nback\nnext\nrate 3 3 3\nsubmit\n";
        let (state, out) = drive(&runner, script, Some("abc123")).await;

        let state = state.unwrap();
        assert!(state.is_complete());
        assert!(out.contains("Evaluation finished"));
        assert!(dir.path().join("results").join("abc123.csv").exists());
    }

    #[tokio::test]
    async fn test_run_resume_greets_returning_tester() {
        let dir = tempdir().unwrap();
        let runner = create_runner(dir.path(), OutputFormat::Plain);
        drive(&runner, "rate 2 2 2\nsubmit\nquit\n", Some("abc")).await;

        let (state, out) = drive(&runner, "quit\n", Some("abc")).await;
        assert!(out.contains("Welcome back! Your ID: abc"));
        assert!(out.contains("Sample 2 / 2"));
        assert_eq!(state.unwrap().cursor, 1);
    }

    #[tokio::test]
    async fn test_run_back_prefills_previous_scores() {
        let dir = tempdir().unwrap();
        let runner = create_runner(dir.path(), OutputFormat::Json);
        let (_, out) = drive(&runner, "rate 4 5 3\nsubmit\nback\n", Some("abc")).await;

        let last: serde_json::Value = serde_json::from_str(out.lines().last().unwrap()).unwrap();
        assert_eq!(last["view"]["cursor"], 0);
        assert_eq!(last["view"]["prefilled"]["naturalness"], 4.0);
        assert_eq!(last["draft"]["similarity"], 3.0);
        assert_eq!(last["view"]["nav"]["forward"], true);
    }

    #[tokio::test]
    async fn test_run_rejects_submit_after_completion() {
        let dir = tempdir().unwrap();
        let runner = create_runner(dir.path(), OutputFormat::Plain);
        let script = "rate 1 1 1\nsubmit\nrate 2 2 2\nsubmit\nrate 3 3 3\nsubmit\n";
        let (state, out) = drive(&runner, script, Some("abc")).await;

        assert!(out.contains("evaluation already finished"));
        let state = state.unwrap();
        assert_eq!(state.scores.naturalness, vec![Score::One, Score::Two]);
    }
}
