use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Count and page title recorded for one key in one realm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    #[serde(rename = "Count")]
    pub count: u64,
    #[serde(rename = "Title", default)]
    pub title: String,
}

impl HitRecord {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            count: 0,
            title: title.into(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.count == 0 && self.title.is_empty()
    }
}

/// Key -> record mapping for a single realm.
pub type RealmMap = BTreeMap<String, HitRecord>;

/// Realm -> key -> record, the on-disk shape of the counter snapshot.
pub type CounterSnapshot = BTreeMap<String, RealmMap>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(rename = "Count")]
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "Answers", default)]
    pub answers: BTreeMap<String, AnswerRecord>,
}

impl Question {
    pub fn with_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            answers: answers
                .into_iter()
                .map(|(id, count)| (id.into(), AnswerRecord { count }))
                .collect(),
        }
    }

    pub fn count(&self, answer_id: &str) -> Option<u64> {
        self.answers.get(answer_id).map(|answer| answer.count)
    }
}

/// Owned copy of a question handed out across the manager lock.
pub type QuestionSnapshot = Question;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "Questions", default)]
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}
