mod manager;

pub use manager::{FlushReport, QuizManager};
