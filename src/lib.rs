// ============================================================================
// TallyDB Library
// ============================================================================

pub mod app;
pub mod canonical;
pub mod config;
pub mod core;
pub mod counter;
pub mod quiz;
pub mod resolver;
pub mod rolling;
pub mod storage;
pub mod sweeper;
pub mod web;

// Re-export main types for convenience
pub use config::{QuizConfig, ResolverConfig, ServerConfig, StoreConfig};
pub use core::{
    AnswerRecord, CounterSnapshot, HitRecord, Question, QuestionSnapshot, Quiz, RealmMap, Result,
    TallyError,
};
pub use counter::CounterStore;
pub use quiz::{FlushReport, QuizManager};
pub use resolver::{HttpTitleResolver, TitleResolver, extract_title};
pub use rolling::RollingLog;
pub use storage::{DirectoryStore, EntityStore, MemoryStore, SnapshotFile};
pub use sweeper::{Flush, SweepHealth, Sweeper};
