//! # Evaluator Trait
//!
//! Scores a finished transcript. Invoked once per terminal session by the
//! batch scheduler, never by the conversation orchestrator.

use async_trait::async_trait;

use parley_core::batch::Evaluation;
use parley_core::session::Session;

/// Errors an evaluator can fail with.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    /// Scoring failed; the scenario result keeps its transcript but no
    /// evaluation.
    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Core evaluator trait.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Score one finished session.
    async fn score(&self, session: &Session) -> Result<Evaluation, EvaluatorError>;
}

/// Evaluator that returns a fixed score — the offline stand-in used by
/// tests and dry runs.
#[derive(Clone, Debug)]
pub struct FixedEvaluator {
    score: u8,
    comment: String,
}

impl FixedEvaluator {
    /// Create an evaluator returning the given score for every transcript.
    #[must_use]
    pub fn new(score: u8, comment: impl Into<String>) -> Self {
        Self {
            score,
            comment: comment.into(),
        }
    }
}

impl Default for FixedEvaluator {
    fn default() -> Self {
        Self::new(3, "transcript accepted")
    }
}

#[async_trait]
impl Evaluator for FixedEvaluator {
    async fn score(&self, _session: &Session) -> Result<Evaluation, EvaluatorError> {
        Ok(Evaluation {
            score: self.score,
            comment: self.comment.clone(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_evaluator_scores_everything() {
        let eval = FixedEvaluator::new(2, "meh");
        let session = Session::new("s", "sales");
        let verdict = eval.score(&session).await.unwrap();
        assert_eq!(verdict.score, 2);
        assert_eq!(verdict.comment, "meh");
    }

    #[test]
    fn evaluator_is_object_safe() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Evaluator>();
    }
}
