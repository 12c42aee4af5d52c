use super::persistence::atomic_write;
use super::traits::EntityStore;
use crate::core::{Quiz, Result, TallyError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Characters that never reach a file name.
pub const ILLEGAL_NAME_CHARS: &str = "./\\%$!@| \"<>?";

/// Directory-of-files backing store: one `<root>/<id>.json` per quiz.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an identifier to its file, rejecting anything unsafe first.
    pub fn entity_path(&self, id: &str) -> Result<PathBuf> {
        validate_entity_id(id)?;
        Ok(self.root.join(format!("{id}.json")))
    }
}

pub fn validate_entity_id(id: &str) -> Result<()> {
    if id.is_empty() || id.chars().any(|c| ILLEGAL_NAME_CHARS.contains(c) || c.is_control()) {
        return Err(TallyError::InvalidName(id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl EntityStore for DirectoryStore {
    async fn load_quiz(&self, id: &str) -> Result<Quiz> {
        let path = self.entity_path(id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(TallyError::NotFound(format!("quiz {:?}", id)));
            }
            Err(err) => {
                return Err(TallyError::LoadFailed(format!(
                    "Failed to read '{}': {}",
                    path.display(),
                    err
                )));
            }
        };

        serde_json::from_slice(&bytes).map_err(|err| {
            TallyError::LoadFailed(format!("parse quiz '{}': {}", path.display(), err))
        })
    }

    async fn save_quiz(&self, id: &str, quiz: &Quiz) -> Result<()> {
        let path = self.entity_path(id)?;
        let bytes = serde_json::to_vec_pretty(quiz)
            .map_err(|err| TallyError::PersistFailed(format!("serialize quiz {:?}: {}", id, err)))?;
        atomic_write(&path, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Question;
    use tempfile::TempDir;

    #[test]
    fn test_entity_path_for_plain_names() {
        let store = DirectoryStore::new("validpath");
        assert_eq!(
            store.entity_path("quiz").unwrap(),
            Path::new("validpath").join("quiz.json")
        );
        assert_eq!(
            store.entity_path("Quiz_2024-b").unwrap(),
            Path::new("validpath").join("Quiz_2024-b.json")
        );
    }

    #[test]
    fn test_illegal_names_are_rejected() {
        let store = DirectoryStore::new("validpath");
        for name in [
            "back\\slash",
            "pipe|pipe",
            "../escape",
            "dir/child",
            "with space",
            "100%",
            "q?",
            "",
            "a\nb",
        ] {
            let err = store.entity_path(name).unwrap_err();
            assert!(
                matches!(err, TallyError::InvalidName(ref n) if n == name),
                "expected InvalidName for {:?}, got {:?}",
                name,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        let quiz = Quiz::new(vec![Question::with_answers([("fish", 5), ("fowl", 27)])]);

        store.save_quiz("quiz1", &quiz).await.unwrap();
        assert!(dir.path().join("quiz1.json").exists());
        assert_eq!(store.load_quiz("quiz1").await.unwrap(), quiz);
    }

    #[tokio::test]
    async fn test_missing_quiz_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        let err = store.load_quiz("nothing-here").await.unwrap_err();
        assert!(matches!(err, TallyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_name_never_touches_disk() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path().join("quizzes"));
        let err = store.save_quiz("a|b", &Quiz::default()).await.unwrap_err();
        assert!(matches!(err, TallyError::InvalidName(_)));
        assert!(!dir.path().join("quizzes").exists());
    }

    #[tokio::test]
    async fn test_garbage_file_is_load_failure() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"not json").unwrap();
        let store = DirectoryStore::new(dir.path());
        let err = store.load_quiz("bad").await.unwrap_err();
        assert!(matches!(err, TallyError::LoadFailed(_)));
    }
}
