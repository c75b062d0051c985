//! Plain-text rendering of live progress and the final summary.

use std::fmt::Write;

use interview_core::clock::format_elapsed;
use interview_core::evaluation::Evaluation;
use interview_core::session::{Advisory, Phase, SessionSnapshot, SessionSummary};

/// Turns a stream of snapshots into the lines worth printing.
#[derive(Debug, Default)]
pub struct ProgressNarrator {
    last_phase: Option<(usize, Phase)>,
    last_advisory: Option<(usize, Advisory)>,
    evaluations_seen: usize,
}

impl ProgressNarrator {
    pub fn observe(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        let evaluated: Vec<&Evaluation> = snapshot
            .answers
            .iter()
            .filter_map(|a| a.evaluation.as_ref())
            .collect();
        for evaluation in evaluated.iter().skip(self.evaluations_seen) {
            lines.push(render_evaluation(evaluation));
        }
        self.evaluations_seen = evaluated.len();

        let position = (snapshot.current_index, snapshot.phase);
        if self.last_phase != Some(position) && !snapshot.status.is_terminal() {
            self.last_phase = Some(position);
            if snapshot.phase == Phase::Evaluating {
                lines.push("[evaluating] scoring your answer...".to_string());
            }
        }

        // The same advisory on a later question is a new event.
        let advisory = snapshot
            .advisory
            .clone()
            .map(|advisory| (snapshot.current_index, advisory));
        if advisory != self.last_advisory {
            if let Some((_, advisory)) = &advisory {
                lines.push(describe_advisory(advisory));
            }
            self.last_advisory = advisory;
        }

        lines
    }
}

pub fn describe_advisory(advisory: &Advisory) -> String {
    match advisory {
        Advisory::SpeechOutputFailed(reason) => {
            format!("[warning] could not speak the question ({reason}). Type :replay to try again.")
        }
        Advisory::SpeechInputFailed(reason) => {
            format!("[warning] listening failed ({reason}). Type :replay or :stop.")
        }
        Advisory::EmptyAnswer => {
            "[notice] no answer heard. Type :replay to answer again, or :stop to skip.".to_string()
        }
        Advisory::EvaluationFailed {
            question_index,
            reason,
        } => {
            format!(
                "[warning] could not score the answer to question {} ({reason}). Moving on.",
                question_index + 1
            )
        }
    }
}

pub fn render_evaluation(evaluation: &Evaluation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[feedback] score {:.1}/10", evaluation.score);
    write_list(&mut out, "Strengths", &evaluation.strengths);
    write_list(&mut out, "Missing", &evaluation.missing_concepts);
    write_list(&mut out, "Suggestions", &evaluation.suggestions);
    let _ = write!(out, "  Ideal answer: {}", evaluation.ideal_answer);
    out
}

fn write_list(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {label}:");
    for item in items {
        let _ = writeln!(out, "    - {item}");
    }
}

pub fn render_summary(summary: &SessionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Interview summary ===");
    let _ = writeln!(out, "Role:       {}", summary.role);
    let _ = writeln!(out, "Difficulty: {}", summary.difficulty);
    let _ = writeln!(out, "Duration:   {}", format_elapsed(summary.duration_seconds));
    let _ = writeln!(
        out,
        "Answered:   {}/{}{}",
        summary.answered_questions,
        summary.total_questions,
        if summary.ended_early { " (ended early)" } else { "" }
    );
    let _ = writeln!(out, "Average:    {:.1}/10", summary.average_score);

    for record in &summary.answers {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Q{} [{} / {}] {}",
            record.question_index + 1,
            record.question.topic_name,
            record.question.difficulty,
            record.question.text
        );
        if record.is_blank() {
            let _ = writeln!(out, "  (no answer)");
        } else {
            let _ = writeln!(out, "  Your answer: {}", record.raw_answer_text.trim());
        }
        match &record.evaluation {
            Some(evaluation) => {
                let _ = writeln!(out, "  {}", render_evaluation(evaluation).replace('\n', "\n  "));
            }
            None => {
                let _ = writeln!(out, "  (not scored)");
            }
        }
    }
    out
}
