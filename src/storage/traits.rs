//! Backing-store contract for per-entity persistence.

use crate::core::{Quiz, Result};
use async_trait::async_trait;

/// Loads and saves whole quizzes by identifier.
///
/// Implementations must validate `id` before touching storage and report
/// `InvalidName` for identifiers they cannot map safely, `NotFound` when no
/// quiz exists under a valid identifier, and `LoadFailed` when one exists but
/// cannot be read. `QuizManager` reports the last case to callers as
/// `NotFound`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn load_quiz(&self, id: &str) -> Result<Quiz>;

    async fn save_quiz(&self, id: &str, quiz: &Quiz) -> Result<()>;
}
