use crate::config::QuizConfig;
use crate::core::{Question, QuestionSnapshot, Quiz, Result, TallyError};
use crate::storage::{DirectoryStore, EntityStore, validate_entity_id};
use crate::sweeper::{Flush, HealthTransition, SweepHealth, Sweeper};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};

struct ResidentQuiz {
    quiz: Quiz,
    revision: u64,
    saved: u64,
    save_health: SweepHealth,
}

impl ResidentQuiz {
    fn clean(quiz: Quiz) -> Self {
        Self {
            quiz,
            revision: 0,
            saved: 0,
            save_health: SweepHealth::Ok,
        }
    }

    fn is_dirty(&self) -> bool {
        self.revision != self.saved
    }
}

/// Outcome of one pass over the dirty quizzes.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub saved: Vec<String>,
    pub failed: Vec<(String, TallyError)>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Lazily loads quizzes from an [`EntityStore`], counts submitted answers in
/// memory and writes dirty quizzes back.
///
/// Quizzes become resident on first access; `quiz_ids` only reports those.
/// Everything returned to callers is an owned copy.
pub struct QuizManager {
    store: Arc<dyn EntityStore>,
    quizzes: Mutex<HashMap<String, ResidentQuiz>>,
    flush_lock: Mutex<()>,
    sweeper: Mutex<Option<Sweeper>>,
    sweep_interval: Duration,
}

impl QuizManager {
    pub fn new(store: Arc<dyn EntityStore>, sweep_interval: Duration) -> Self {
        Self {
            store,
            quizzes: Mutex::new(HashMap::new()),
            flush_lock: Mutex::new(()),
            sweeper: Mutex::new(None),
            sweep_interval,
        }
    }

    /// Manager over a directory of `<id>.json` files.
    pub fn with_directory(config: &QuizConfig) -> Self {
        Self::new(
            Arc::new(DirectoryStore::new(&config.directory)),
            config.sweep_interval,
        )
    }

    async fn resident<'a>(
        &self,
        quizzes: &'a mut HashMap<String, ResidentQuiz>,
        quiz_id: &str,
    ) -> Result<&'a mut ResidentQuiz> {
        match quizzes.entry(quiz_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let quiz = match self.store.load_quiz(quiz_id).await {
                    Ok(quiz) => quiz,
                    Err(err @ (TallyError::InvalidName(_) | TallyError::NotFound(_))) => {
                        return Err(err);
                    }
                    Err(err) => {
                        // Unreadable and unparseable files look like absent quizzes to callers.
                        warn!(quiz = %quiz_id, error = %err, "could not load quiz");
                        return Err(TallyError::NotFound(format!("quiz {:?}", quiz_id)));
                    }
                };
                debug!(quiz = %quiz_id, questions = quiz.questions.len(), "quiz loaded");
                Ok(entry.insert(ResidentQuiz::clean(quiz)))
            }
        }
    }

    /// Counts one answer and returns a copy of that question's tallies.
    pub async fn submit_answer(
        &self,
        quiz_id: &str,
        question: i64,
        answer_id: &str,
    ) -> Result<QuestionSnapshot> {
        let span = info_span!("quiz.submit", quiz = %quiz_id, question, answer = %answer_id);
        async move {
            let mut quizzes = self.quizzes.lock().await;
            let resident = self.resident(&mut quizzes, quiz_id).await?;

            let len = resident.quiz.questions.len();
            let slot = usize::try_from(question)
                .ok()
                .filter(|index| *index < len)
                .ok_or(TallyError::OutOfRange { index: question, len })?;

            let entry: &mut Question = &mut resident.quiz.questions[slot];
            let answer = entry
                .answers
                .get_mut(answer_id)
                .ok_or_else(|| TallyError::NotFound(format!("answerID {:?}", answer_id)))?;
            answer.count += 1;
            let snapshot = entry.clone();
            resident.revision += 1;

            info!("QUIZ {:?}[{}] = {:?}", quiz_id, question, answer_id);
            Ok(snapshot)
        }
        .instrument(span)
        .await
    }

    /// Identifiers of the quizzes currently held in memory.
    pub async fn quiz_ids(&self) -> BTreeSet<String> {
        self.quizzes.lock().await.keys().cloned().collect()
    }

    /// Copy of every question of a quiz, loading it if needed.
    pub async fn results(&self, quiz_id: &str) -> Result<Vec<QuestionSnapshot>> {
        let mut quizzes = self.quizzes.lock().await;
        let resident = self.resident(&mut quizzes, quiz_id).await?;
        Ok(resident.quiz.questions.clone())
    }

    /// Makes `quiz` resident under `quiz_id`, replacing any resident copy.
    /// It reaches the backing store on the next flush.
    pub async fn put_quiz(&self, quiz_id: &str, quiz: Quiz) -> Result<()> {
        validate_entity_id(quiz_id)?;
        let mut quizzes = self.quizzes.lock().await;
        match quizzes.entry(quiz_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let resident = entry.get_mut();
                resident.quiz = quiz;
                resident.revision += 1;
            }
            Entry::Vacant(entry) => {
                let mut resident = ResidentQuiz::clean(quiz);
                resident.revision = 1;
                entry.insert(resident);
            }
        }
        Ok(())
    }

    /// `None` when the quiz is not resident.
    pub async fn is_dirty(&self, quiz_id: &str) -> Option<bool> {
        self.quizzes.lock().await.get(quiz_id).map(ResidentQuiz::is_dirty)
    }

    /// Saves every dirty resident quiz. A failed save is logged and skipped;
    /// that quiz stays dirty for the next pass.
    pub async fn flush_dirty(&self) -> FlushReport {
        let _flushing = self.flush_lock.lock().await;

        let pending: Vec<(String, Quiz, u64)> = {
            let quizzes = self.quizzes.lock().await;
            quizzes
                .iter()
                .filter(|(_, resident)| resident.is_dirty())
                .map(|(id, resident)| (id.clone(), resident.quiz.clone(), resident.revision))
                .collect()
        };
        if pending.is_empty() {
            return FlushReport::default();
        }
        debug!(count = pending.len(), "saving dirty quizzes");

        let mut outcomes = Vec::with_capacity(pending.len());
        for (id, quiz, revision) in pending {
            let result = self.store.save_quiz(&id, &quiz).await;
            outcomes.push((id, revision, result));
        }

        let mut report = FlushReport::default();
        let mut quizzes = self.quizzes.lock().await;
        for (id, revision, result) in outcomes {
            let succeeded = result.is_ok();
            if let Some(resident) = quizzes.get_mut(&id) {
                if succeeded {
                    resident.saved = resident.saved.max(revision);
                }
                match resident.save_health.observe(succeeded) {
                    HealthTransition::Failed => {
                        if let Err(err) = &result {
                            warn!(quiz = %id, error = %err, "could not save quiz");
                        }
                    }
                    HealthTransition::Recovered => info!(quiz = %id, "quiz saved again"),
                    HealthTransition::Steady => {}
                }
            }
            match result {
                Ok(()) => report.saved.push(id),
                Err(err) => report.failed.push((id, err)),
            }
        }
        report
    }

    /// Starts the periodic flush task if it is not already running.
    pub async fn start_sweeper(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_none() {
            *sweeper = Some(Sweeper::spawn(Arc::downgrade(self), self.sweep_interval));
        }
    }

    /// Stops the sweeper, flushes, and drops every quiz that reached storage.
    /// Quizzes whose final save failed stay resident so a later flush can
    /// retry them.
    pub async fn shutdown(&self) -> Result<FlushReport> {
        let sweeper = self.sweeper.lock().await.take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await?;
        }

        let report = self.flush_dirty().await;
        let mut quizzes = self.quizzes.lock().await;
        quizzes.retain(|_, resident| resident.is_dirty());
        for (id, err) in &report.failed {
            error!(quiz = %id, error = %err, "quiz not saved at shutdown");
        }
        Ok(report)
    }
}

#[async_trait]
impl Flush for QuizManager {
    fn label(&self) -> &'static str {
        "quiz manager"
    }

    async fn flush(&self) -> Result<()> {
        let report = self.flush_dirty().await;
        if report.is_clean() {
            return Ok(());
        }
        Err(TallyError::PersistFailed(format!(
            "{} quiz(zes) failed to save: {}",
            report.failed.len(),
            report
                .failed
                .iter()
                .map(|(id, _)| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}
