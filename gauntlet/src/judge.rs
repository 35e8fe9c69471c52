//! LLM-as-judge: prompt construction and verdict parsing.
//!
//! The judge is asked for a strict JSON object. Models being models, the
//! response often is not one; [`parse_verdict`] falls back to a textual rule
//! and never fails. Parsing is a pure function of the response string, so the
//! same response always yields the same verdict and score.

use once_cell::sync::Lazy;
use regex::Regex;
use run_event::Verdict;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterError, ChatMessage, CompletionRequest, ModelClient};
use crate::entity::{Model, Problem, Provider};
use crate::retry::RetryPolicy;

pub const JUDGE_SYSTEM_PROMPT: &str = "You are a strict grader for AI benchmark answers. \
Respond with a single JSON object with fields \"verdict\" (\"PASS\" or \"FAIL\"), \
\"reasoning\" (string) and \"score\" (integer 0-100). No other text.";

/// Builds the system+user message pair for grading one candidate answer.
pub fn build_judge_messages(problem: &Problem, candidate_output: &str) -> Vec<ChatMessage> {
    let expected = problem
        .expected
        .as_deref()
        .unwrap_or("(no expected answer was provided)");
    let user = format!(
        "Problem:\n{}\n\nExpected answer:\n{}\n\nCandidate answer:\n{}\n\nGrade the candidate answer.",
        problem.prompt, expected, candidate_output
    );
    vec![
        ChatMessage::system(JUDGE_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub verdict: Verdict,
    pub score: i64,
    pub reasoning: String,
}

impl JudgeVerdict {
    pub fn pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

static PASS_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bPASS\b").expect("static regex"));
static FAIL_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bFAIL\b").expect("static regex"));

/// Parses a judge response.
///
/// 1. A JSON object with `verdict`/`reasoning`/`score` is read directly;
///    a missing score defaults to 100 on PASS and 0 otherwise.
/// 2. Anything else goes through the textual rule: pass when the response
///    contains the word PASS or starts with YES, negated by the word FAIL.
///
/// Verdict and score are stored as reported even when they contradict each
/// other; downstream readers treat score ≥ 50 as authoritative.
pub fn parse_verdict(response: &str) -> JudgeVerdict {
    let trimmed = response.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            let pass = v["verdict"]
                .as_str()
                .map(|s| s.eq_ignore_ascii_case("PASS"))
                .unwrap_or(false);
            let score = v["score"]
                .as_i64()
                .unwrap_or(if pass { 100 } else { 0 })
                .clamp(0, 100);
            let reasoning = v["reasoning"].as_str().unwrap_or("").to_string();
            return JudgeVerdict {
                verdict: if pass { Verdict::Pass } else { Verdict::Fail },
                score,
                reasoning,
            };
        }
    }

    let pass = (PASS_WORD.is_match(response) || trimmed.starts_with("YES"))
        && !FAIL_WORD.is_match(response);
    let head: String = response.chars().take(200).collect();
    let word = if pass { "PASS" } else { "FAIL" };
    JudgeVerdict {
        verdict: if pass { Verdict::Pass } else { Verdict::Fail },
        score: if pass { 100 } else { 0 },
        reasoning: format!("Simple verdict: {word}. Full response: {head}"),
    }
}

/// Calls the judge model (through the retry policy) and parses its verdict.
pub async fn judge_answer(
    client: &dyn ModelClient,
    retry: &RetryPolicy,
    judge_provider: &Provider,
    judge_model: &Model,
    problem: &Problem,
    candidate_output: &str,
    cancel: &CancellationToken,
) -> Result<JudgeVerdict, AdapterError> {
    let messages = build_judge_messages(problem, candidate_output);
    let response = retry
        .run(cancel, "judge", |_| {
            let req = CompletionRequest::for_model(
                judge_provider,
                judge_model,
                messages.clone(),
                cancel.clone(),
            );
            client.complete(req)
        })
        .await?;
    Ok(parse_verdict(&response))
}
