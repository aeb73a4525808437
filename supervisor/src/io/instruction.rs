//! Instruction payload builder for worker sessions.
//!
//! Renders the embedded template, then enforces a byte budget by dropping
//! droppable sections (marked with HTML comments in the template) before
//! truncating as a last resort. The one-time guidance block is injected only
//! when the caller still holds it; the loop consumes it after the first
//! session so it is never repeated.

use minijinja::{Environment, context};
use tracing::debug;

use crate::session::SessionOutcome;

const WORKER_TEMPLATE: &str = include_str!("prompts/worker.md");

/// Byte budget for the rendered instruction payload.
pub const INSTRUCTION_BUDGET_BYTES: usize = 48_000;

/// Inputs for one session's instruction payload.
#[derive(Debug, Clone)]
pub struct InstructionInputs {
    /// Standing goal, injected into every session.
    pub goal: String,
    /// One-time guidance from `--init`/`--request`; first session only.
    pub guidance: Option<String>,
    /// Work items still pending or in progress.
    pub remaining: u64,
    /// Outcome of the previous session, if there was one.
    pub last_outcome: Option<SessionOutcome>,
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Builds an instruction payload within a byte budget.
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    budget_bytes: usize,
}

impl InstructionBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Render the payload for one session.
    pub fn build(&self, inputs: &InstructionInputs) -> String {
        let mut env = Environment::new();
        env.add_template("worker", WORKER_TEMPLATE)
            .expect("worker template should be valid");
        let template = env.get_template("worker").expect("worker template");
        let rendered = template
            .render(context! {
                goal => inputs.goal.trim(),
                guidance => inputs.guidance.as_deref().map(str::trim).filter(|s| !s.is_empty()),
                status => status_body(inputs),
            })
            .expect("worker template rendering should not fail");

        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn status_body(inputs: &InstructionInputs) -> String {
    let mut lines = vec![format!(
        "Work items still pending or in progress: {}.",
        inputs.remaining
    )];
    if inputs.last_outcome == Some(SessionOutcome::Crashed) {
        lines.push(
            "The previous session ended abnormally; its item status has been \
             reconciled against commit history, so trust the store over any \
             notes it left behind."
                .to_string(),
        );
    }
    lines.join("\n")
}

/// Parse sections using `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
    });

    let mut sections = Vec::new();
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();

    for (i, caps) in matches.iter().enumerate() {
        let key = caps.get(1).unwrap().as_str().to_string();
        let required = caps.get(2).unwrap().as_str() == "required";
        let start = caps.get(0).unwrap().end();
        let end = matches
            .get(i + 1)
            .map(|m| m.get(0).unwrap().start())
            .unwrap_or(rendered.len());

        let content = rendered[start..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key,
                required,
                content,
            });
        }
    }

    sections
}

/// Drop droppable sections, then truncate the last section if still over.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    while total_len(sections) > budget {
        let Some(idx) = sections.iter().rposition(|s| !s.required) else {
            break;
        };
        debug!(
            section = %sections[idx].key,
            bytes_dropped = sections[idx].content.len(),
            "dropped section for budget"
        );
        sections.remove(idx);
    }

    if total_len(sections) > budget && !sections.is_empty() {
        let other_len: usize = sections
            .iter()
            .take(sections.len() - 1)
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        let last = sections.last_mut().unwrap();
        if last.content.len() > allowed {
            if allowed > 12 {
                last.content.truncate(allowed - 12);
                last.content.push_str("\n[truncated]");
            } else {
                last.content.truncate(allowed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::COMPLETION_SENTINEL;

    fn inputs() -> InstructionInputs {
        InstructionInputs {
            goal: "Ship the widget service.".to_string(),
            guidance: None,
            remaining: 3,
            last_outcome: None,
        }
    }

    #[test]
    fn payload_carries_contract_goal_and_status_in_order() {
        let payload = InstructionBuilder::new(INSTRUCTION_BUDGET_BYTES).build(&inputs());

        let contract = payload.find("### Operating Contract").expect("contract");
        let goal = payload.find("### Goal").expect("goal");
        let status = payload.find("### Work Status").expect("status");
        assert!(contract < goal);
        assert!(goal < status);
        assert!(payload.contains("Ship the widget service."));
        assert!(payload.contains("pending or in progress: 3"));
    }

    #[test]
    fn payload_explains_the_completion_sentinel() {
        let payload = InstructionBuilder::new(INSTRUCTION_BUDGET_BYTES).build(&inputs());
        assert!(payload.contains(COMPLETION_SENTINEL));
    }

    #[test]
    fn guidance_appears_only_when_present() {
        let without = InstructionBuilder::new(INSTRUCTION_BUDGET_BYTES).build(&inputs());
        assert!(!without.contains("### One-Time Guidance"));

        let mut with_guidance = inputs();
        with_guidance.guidance = Some("Generate the initial work items.".to_string());
        let with = InstructionBuilder::new(INSTRUCTION_BUDGET_BYTES).build(&with_guidance);
        assert!(with.contains("### One-Time Guidance"));
        assert!(with.contains("Generate the initial work items."));
    }

    #[test]
    fn crash_note_rides_in_the_status_section() {
        let mut crashed = inputs();
        crashed.last_outcome = Some(SessionOutcome::Crashed);
        let payload = InstructionBuilder::new(INSTRUCTION_BUDGET_BYTES).build(&crashed);
        assert!(payload.contains("ended abnormally"));
    }

    #[test]
    fn budget_drops_status_before_touching_required_sections() {
        let mut big = inputs();
        big.goal = "goal ".repeat(40);
        let payload = InstructionBuilder::new(900).build(&big);

        assert!(!payload.contains("### Work Status"));
        assert!(payload.contains("### Operating Contract"));
        assert!(payload.contains("### Goal"));
    }

    #[test]
    fn over_budget_payload_is_truncated_with_a_marker() {
        let mut huge = inputs();
        huge.goal = "x".repeat(100_000);
        let payload = InstructionBuilder::new(2_000).build(&huge);

        assert!(payload.len() < 3_000);
        assert!(payload.contains("[truncated]"));
    }
}
