//! Prompt kinds and templates for the dbanalyst agent
//!
//! Every completion request carries a [`PromptKind`]. The templates are fixed:
//! one system prompt plus one user message per kind, with the run-state values
//! substituted in.

use serde::{Deserialize, Serialize};

/// The four decisions the agent asks a model to make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Break a question into ordered sub-goals
    Plan,
    /// Write SQL for a sub-goal
    GenerateSql,
    /// Revise SQL that failed to execute
    CorrectSql,
    /// Turn collected results into an answer
    Synthesize,
}

impl PromptKind {
    /// Parse a prompt kind name
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not recognized.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "plan" => Ok(Self::Plan),
            "generate_sql" | "generate-sql" => Ok(Self::GenerateSql),
            "correct_sql" | "correct-sql" => Ok(Self::CorrectSql),
            "synthesize" => Ok(Self::Synthesize),
            _ => Err(format!(
                "Unknown prompt kind '{s}'. Available kinds: plan, generate_sql, correct_sql, synthesize"
            )),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::GenerateSql => "generate_sql",
            Self::CorrectSql => "correct_sql",
            Self::Synthesize => "synthesize",
        }
    }

    /// Whether the model is asked to answer with a JSON object
    #[must_use]
    pub const fn expects_json(&self) -> bool {
        matches!(self, Self::Plan)
    }

    /// Fixed system prompt for this kind
    #[must_use]
    pub const fn system_prompt(&self) -> &'static str {
        match self {
            Self::Plan => PLAN_SYSTEM,
            Self::GenerateSql | Self::CorrectSql => SQL_SYSTEM,
            Self::Synthesize => SYNTHESIZE_SYSTEM,
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const PLAN_SYSTEM: &str = "You are a data analyst planning database work. \
Break the user's question into steps that can each be answered with one SQL query \
against the schema you are given. Use a single step when one query is enough. \
Create a separate step for each independent part of a multi-part question. \
Reply with JSON only.";

const SQL_SYSTEM: &str = "You write SQLite queries. Reply with exactly one read-only \
SELECT (or WITH ... SELECT) statement and nothing else: no explanation, no markdown. \
Only use tables and columns present in the schema. Do not add date filters the task \
does not ask for.";

const SYNTHESIZE_SYSTEM: &str = "You are a data analyst. Answer the user's question \
from the collected query results in clear natural language. If a step is marked as \
not determined, say that part could not be answered.";

/// A system prompt and user message ready to send to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub kind: PromptKind,
    pub system: String,
    pub user: String,
}

impl RenderedPrompt {
    fn new(kind: PromptKind, user: String) -> Self {
        Self {
            kind,
            system: kind.system_prompt().to_string(),
            user,
        }
    }
}

/// Planning prompt: question plus schema, asking for `{"plan": [...]}`
#[must_use]
pub fn render_plan(question: &str, schema: &str, max_steps: usize) -> RenderedPrompt {
    let user = format!(
        "QUESTION: \"{question}\"\n\n\
         DATABASE SCHEMA:\n---\n{schema}\n---\n\n\
         Use at most {max_steps} steps. Each step must describe one concrete query.\n\
         Answer in this JSON format:\n\
         {{\"plan\": [\"Step 1 description\", \"Step 2 description\"]}}"
    );
    RenderedPrompt::new(PromptKind::Plan, user)
}

/// Initial SQL prompt for one sub-goal
#[must_use]
pub fn render_generate_sql(
    question: &str,
    schema: &str,
    sub_goal: &str,
    prior_results_json: &str,
) -> RenderedPrompt {
    let user = format!(
        "ORIGINAL QUESTION: \"{question}\"\n\n\
         DATABASE SCHEMA:\n---\n{schema}\n---\n\n\
         RESULTS OF PREVIOUS STEPS (JSON):\n{prior_results_json}\n\n\
         CURRENT TASK: \"{sub_goal}\"\n\n\
         Write the SQLite query for the current task."
    );
    RenderedPrompt::new(PromptKind::GenerateSql, user)
}

/// Correction prompt: the failed statement and its error are shown verbatim
#[must_use]
pub fn render_correct_sql(
    question: &str,
    schema: &str,
    sub_goal: &str,
    prior_results_json: &str,
    failed_sql: &str,
    error: &str,
) -> RenderedPrompt {
    let user = format!(
        "ORIGINAL QUESTION: \"{question}\"\n\n\
         DATABASE SCHEMA:\n---\n{schema}\n---\n\n\
         RESULTS OF PREVIOUS STEPS (JSON):\n{prior_results_json}\n\n\
         CURRENT TASK: \"{sub_goal}\"\n\n\
         YOUR PREVIOUS QUERY FAILED:\n{failed_sql}\n\n\
         ERROR:\n{error}\n\n\
         Read the error, fix the mistake and write the corrected SQLite query."
    );
    RenderedPrompt::new(PromptKind::CorrectSql, user)
}

/// Synthesis prompt over the ordered step results
#[must_use]
pub fn render_synthesize(question: &str, results_json: &str) -> RenderedPrompt {
    let user = format!(
        "ORIGINAL QUESTION: \"{question}\"\n\n\
         COLLECTED DATA (JSON):\n---\n{results_json}\n---\n\n\
         Using the data above, write a clear final answer to the original question."
    );
    RenderedPrompt::new(PromptKind::Synthesize, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_kinds() {
        assert_eq!(PromptKind::parse("plan").unwrap(), PromptKind::Plan);
        assert_eq!(
            PromptKind::parse("generate-sql").unwrap(),
            PromptKind::GenerateSql
        );
        assert_eq!(
            PromptKind::parse("CORRECT_SQL").unwrap(),
            PromptKind::CorrectSql
        );
        assert_eq!(
            PromptKind::parse("Synthesize").unwrap(),
            PromptKind::Synthesize
        );
    }

    #[test]
    fn test_parse_invalid_kind() {
        let err = PromptKind::parse("summarize").unwrap_err();
        assert!(err.contains("Available kinds"));
    }

    #[test]
    fn test_as_str_round_trips_through_parse() {
        for kind in [
            PromptKind::Plan,
            PromptKind::GenerateSql,
            PromptKind::CorrectSql,
            PromptKind::Synthesize,
        ] {
            assert_eq!(PromptKind::parse(kind.as_str()).unwrap(), kind);
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
    }

    #[test]
    fn test_plan_prompt_mentions_limit_and_format() {
        let prompt = render_plan("How many users?", "CREATE TABLE user(id)", 5);
        assert_eq!(prompt.kind, PromptKind::Plan);
        assert!(prompt.user.contains("at most 5 steps"));
        assert!(prompt.user.contains("{\"plan\":"));
        assert!(prompt.user.contains("CREATE TABLE user(id)"));
        assert!(prompt.kind.expects_json());
    }

    #[test]
    fn test_correction_prompt_carries_error_verbatim() {
        let prompt = render_correct_sql(
            "q",
            "schema",
            "count users",
            "[]",
            "SELECT emial FROM user",
            "no such column: emial",
        );
        assert_eq!(prompt.kind, PromptKind::CorrectSql);
        assert!(prompt.user.contains("SELECT emial FROM user"));
        assert!(prompt.user.contains("no such column: emial"));
        assert_eq!(prompt.system, PromptKind::GenerateSql.system_prompt());
    }
}
