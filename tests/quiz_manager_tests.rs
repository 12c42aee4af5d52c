use std::sync::Arc;
use std::time::Duration;
use tallydb::{
    DirectoryStore, EntityStore, MemoryStore, Question, Quiz, QuizConfig, QuizManager, TallyError,
};
use tempfile::TempDir;

fn animals() -> Quiz {
    Quiz::new(vec![
        Question::with_answers([("fish", 5), ("fowl", 27)]),
        Question::with_answers([("yes", 0), ("no", 0)]),
    ])
}

fn manager(store: MemoryStore) -> (Arc<MemoryStore>, QuizManager) {
    let store = Arc::new(store);
    let manager = QuizManager::new(store.clone(), Duration::from_secs(60));
    (store, manager)
}

#[tokio::test]
async fn submit_counts_one_answer() {
    let (_, manager) = manager(MemoryStore::new().with_quiz("animals", animals()));

    let question = manager.submit_answer("animals", 0, "fish").await.unwrap();
    assert_eq!(question.count("fish"), Some(6));
    assert_eq!(question.count("fowl"), Some(27));
    assert_eq!(manager.is_dirty("animals").await, Some(true));
}

#[tokio::test]
async fn submit_rejects_bad_targets() {
    let (_, manager) = manager(MemoryStore::new().with_quiz("animals", animals()));

    let err = manager.submit_answer("animals", 0, "apple").await.unwrap_err();
    assert!(matches!(err, TallyError::NotFound(_)));

    let err = manager.submit_answer("animals", 27, "fish").await.unwrap_err();
    assert!(matches!(err, TallyError::OutOfRange { index: 27, len: 2 }));

    let err = manager.submit_answer("animals", -1, "fish").await.unwrap_err();
    assert!(matches!(err, TallyError::OutOfRange { index: -1, .. }));

    let err = manager.submit_answer("unknown-quiz", 0, "fish").await.unwrap_err();
    assert!(matches!(err, TallyError::NotFound(_)));

    // Nothing above changed the quiz.
    assert_eq!(manager.is_dirty("animals").await, Some(false));
    assert!(!manager.quiz_ids().await.contains("unknown-quiz"));
}

#[tokio::test]
async fn returned_snapshots_do_not_track_later_submissions() {
    let (_, manager) = manager(MemoryStore::new().with_quiz("animals", animals()));

    let first = manager.submit_answer("animals", 1, "yes").await.unwrap();
    manager.submit_answer("animals", 1, "yes").await.unwrap();
    manager.submit_answer("animals", 1, "no").await.unwrap();

    assert_eq!(first.count("yes"), Some(1));
    assert_eq!(first.count("no"), Some(0));

    let captured = manager.results("animals").await.unwrap();
    manager.submit_answer("animals", 0, "fowl").await.unwrap();
    manager.submit_answer("animals", 1, "no").await.unwrap();
    assert_eq!(captured[0].count("fowl"), Some(27));
    assert_eq!(captured[1].count("yes"), Some(2));
    assert_eq!(captured[1].count("no"), Some(1));

    let results = manager.results("animals").await.unwrap();
    assert_eq!(results[0].count("fowl"), Some(28));
    assert_eq!(results[1].count("yes"), Some(2));
    assert_eq!(results[1].count("no"), Some(2));
}

#[tokio::test]
async fn quiz_ids_lists_resident_quizzes() {
    let store = MemoryStore::new()
        .with_quiz("animals", animals())
        .with_quiz("colours", Quiz::new(vec![Question::with_answers([("red", 1)])]));
    let (_, manager) = manager(store);

    assert!(manager.quiz_ids().await.is_empty());
    manager.results("colours").await.unwrap();
    manager.submit_answer("animals", 0, "fowl").await.unwrap();

    let ids: Vec<String> = manager.quiz_ids().await.into_iter().collect();
    assert_eq!(ids, vec!["animals".to_string(), "colours".to_string()]);
}

#[tokio::test]
async fn failed_save_keeps_the_quiz_dirty() {
    let (store, manager) = manager(MemoryStore::new().with_quiz("animals", animals()));
    manager.submit_answer("animals", 0, "fish").await.unwrap();

    store.set_fail_saves(true);
    let report = manager.flush_dirty().await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(manager.is_dirty("animals").await, Some(true));

    store.set_fail_saves(false);
    let report = manager.flush_dirty().await;
    assert_eq!(report.saved, vec!["animals".to_string()]);
    assert_eq!(manager.is_dirty("animals").await, Some(false));
    assert_eq!(store.stored("animals").await.unwrap().questions[0].count("fish"), Some(6));

    // Clean quizzes are not written again.
    let saves = store.save_count();
    assert!(manager.flush_dirty().await.saved.is_empty());
    assert_eq!(store.save_count(), saves);
}

#[tokio::test]
async fn directory_store_round_trips_through_the_manager() {
    let dir = TempDir::new().unwrap();
    let config = QuizConfig::new(dir.path()).sweep_interval(Duration::from_millis(20));

    let seeded = DirectoryStore::new(dir.path());
    seeded.save_quiz("animals", &animals()).await.unwrap();
    assert!(dir.path().join("animals.json").exists());

    let manager = Arc::new(QuizManager::with_directory(&config));
    manager.start_sweeper().await;
    manager.submit_answer("animals", 0, "fish").await.unwrap();
    let report = manager.shutdown().await.unwrap();
    assert!(report.is_clean());
    assert!(manager.quiz_ids().await.is_empty());

    let reloaded = seeded.load_quiz("animals").await.unwrap();
    assert_eq!(reloaded.questions[0].count("fish"), Some(6));
    assert_eq!(reloaded.questions[0].count("fowl"), Some(27));

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("animals.json")).unwrap()).unwrap();
    assert_eq!(raw["Questions"][0]["Answers"]["fish"]["Count"], 6);
}

#[tokio::test]
async fn directory_store_rejects_unsafe_names() {
    let dir = TempDir::new().unwrap();
    let store = DirectoryStore::new(dir.path());

    for name in ["a\\b", "a|b", "../escape", "with space", ""] {
        let err = store.load_quiz(name).await.unwrap_err();
        assert!(matches!(err, TallyError::InvalidName(_)), "{name:?} gave {err:?}");
    }
    assert_eq!(
        store.entity_path("animals").unwrap(),
        dir.path().join("animals.json")
    );

    let err = store.load_quiz("absent").await.unwrap_err();
    assert!(matches!(err, TallyError::NotFound(_)));

    std::fs::write(dir.path().join("broken.json"), b"[1, 2").unwrap();
    let err = store.load_quiz("broken").await.unwrap_err();
    assert!(matches!(err, TallyError::LoadFailed(_)));
}

#[tokio::test]
async fn corrupt_quiz_file_is_reported_as_not_found() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.json"), b"{ not json").unwrap();
    let manager = QuizManager::with_directory(&QuizConfig::new(dir.path()));

    let err = manager.submit_answer("broken", 0, "fish").await.unwrap_err();
    assert!(matches!(err, TallyError::NotFound(_)), "got {err:?}");
    let err = manager.results("broken").await.unwrap_err();
    assert!(matches!(err, TallyError::NotFound(_)), "got {err:?}");

    let err = manager.submit_answer("with space", 0, "fish").await.unwrap_err();
    assert!(matches!(err, TallyError::InvalidName(_)));
}
