use super::directory::validate_entity_id;
use super::traits::EntityStore;
use crate::core::{Quiz, Result, TallyError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-process entity store for embedding and tests.
///
/// Applies the same name validation as [`super::DirectoryStore`] so callers
/// see identical errors whichever backend is selected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    quizzes: RwLock<HashMap<String, Quiz>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quiz(mut self, id: &str, quiz: Quiz) -> Self {
        self.quizzes.get_mut().insert(id.to_string(), quiz);
        self
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every subsequent save fail with `PersistFailed` until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn stored(&self, id: &str) -> Option<Quiz> {
        self.quizzes.read().await.get(id).cloned()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load_quiz(&self, id: &str) -> Result<Quiz> {
        validate_entity_id(id)?;
        self.quizzes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TallyError::NotFound(format!("quiz {:?}", id)))
    }

    async fn save_quiz(&self, id: &str, quiz: &Quiz) -> Result<()> {
        validate_entity_id(id)?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(TallyError::PersistFailed(format!(
                "memory store refused save of {:?}",
                id
            )));
        }
        self.quizzes.write().await.insert(id.to_string(), quiz.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
