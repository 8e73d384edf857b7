use crate::machine::View;
use crate::models::{RatingInput, Score};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Severity of a message shown to the tester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Notice {
    Info,
    Warning,
    Success,
}

/// Render a view in the specified format
pub fn render_view(view: &View, draft: &RatingInput, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => render_view_plain(view, draft),
        OutputFormat::Json => render_json(&json!({ "view": view, "draft": draft })),
    }
}

/// Render a one-line message in the specified format
pub fn render_notice(notice: Notice, message: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => {
            let tag = match notice {
                Notice::Info => "",
                Notice::Warning => "⚠ ",
                Notice::Success => "✔ ",
            };
            format!("{}{}\n", tag, message)
        }
        OutputFormat::Json => render_json(&json!({ "notice": notice, "message": message })),
    }
}

/// The rating scale, one level per line
pub fn render_scale(format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => {
            let mut out = String::from("Rating scale:\n");
            for score in Score::ALL {
                out.push_str(&format!("  {:<4} {}\n", score.value(), score.label()));
            }
            out
        }
        OutputFormat::Json => {
            let levels: Vec<_> = Score::ALL
                .iter()
                .map(|s| json!({ "value": s.value(), "label": s.label() }))
                .collect();
            render_json(&json!({ "scale": levels }))
        }
    }
}

fn render_view_plain(view: &View, draft: &RatingInput) -> String {
    let mut out = String::new();

    let Some(item) = &view.item else {
        if view.completed {
            out.push_str(&format!("=== All {} samples rated ===\n", view.total));
            out.push_str("Thank you for your feedback! Evaluation finished.\n");
            if view.nav.back {
                out.push_str("Type `back` to review earlier answers.\n");
            }
        } else {
            out.push_str("Nothing to evaluate.\n");
        }
        return out;
    };

    out.push_str(&format!("=== Sample {} / {} ===\n", view.cursor + 1, view.total));
    out.push_str(&format!("Synthesized voice: {}\n", item.audio_path));
    out.push_str(&format!("Reference voice:   {}\n", item.reference_audio_path));
    out.push_str(&format!("Transcript:        {}\n", item.transcript));
    out.push_str(&format!(
        "{:<17} {:<15} {:<15} {:<15}\n",
        "", "Naturalness", "Intelligibility", "Similarity"
    ));
    out.push_str(&format!(
        "{:<17} {:<15} {:<15} {:<15}\n",
        "Selected:",
        selection(draft.naturalness),
        selection(draft.intelligibility),
        selection(draft.similarity)
    ));

    let mut actions = Vec::new();
    if view.nav.back {
        actions.push("back");
    }
    if view.nav.forward {
        actions.push("next");
    }
    if draft.is_complete() {
        actions.push("submit");
    }
    if !actions.is_empty() {
        out.push_str(&format!("Available: {}\n", actions.join(", ")));
    }
    out
}

fn selection(score: Option<Score>) -> &'static str {
    score.map(Score::label).unwrap_or("-")
}

fn render_json(value: &serde_json::Value) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json + "\n",
        Err(e) => format!(
            "{{\"notice\":\"warning\",\"message\":\"serialization failed: {}\"}}\n",
            e
        ),
    }
}
