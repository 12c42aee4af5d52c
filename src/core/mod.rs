pub mod error;
pub mod types;

pub use error::{Result, TallyError};
pub use types::{AnswerRecord, CounterSnapshot, HitRecord, Question, QuestionSnapshot, Quiz, RealmMap};
