use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::QuestionBankError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        f.write_str(name)
    }
}

impl FromStr for Difficulty {
    type Err = QuestionBankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(QuestionBankError::InvalidDifficulty(s.to_string())),
        }
    }
}

/// Session-level difficulty selection. `All` admits every question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DifficultyFilter {
    All,
    Only(Difficulty),
}

impl DifficultyFilter {
    pub fn admits(&self, difficulty: Difficulty) -> bool {
        match self {
            DifficultyFilter::All => true,
            DifficultyFilter::Only(wanted) => *wanted == difficulty,
        }
    }
}

impl Default for DifficultyFilter {
    fn default() -> Self {
        DifficultyFilter::Only(Difficulty::Medium)
    }
}

impl fmt::Display for DifficultyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifficultyFilter::All => f.write_str("All"),
            DifficultyFilter::Only(difficulty) => fmt::Display::fmt(difficulty, f),
        }
    }
}

impl FromStr for DifficultyFilter {
    type Err = QuestionBankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(DifficultyFilter::All)
        } else {
            s.parse().map(DifficultyFilter::Only)
        }
    }
}

impl From<DifficultyFilter> for String {
    fn from(filter: DifficultyFilter) -> Self {
        filter.to_string()
    }
}

impl TryFrom<String> for DifficultyFilter {
    type Error = QuestionBankError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One interview question, already tagged with the topic it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub difficulty: Difficulty,
    pub topic_name: String,
    pub topic_category: String,
}

// On-disk shape of a role's question bank file.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleQuestions {
    pub role: String,
    #[serde(default)]
    pub topics: Vec<TopicQuestions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicQuestions {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub questions: Vec<QuestionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionEntry {
    pub id: String,
    #[serde(rename = "question")]
    pub text: String,
    pub difficulty: Difficulty,
}

/// The pool every session plan is drawn from.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    roles: Vec<RoleQuestions>,
}

impl QuestionBank {
    pub fn new(roles: Vec<RoleQuestions>) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.role.as_str())
    }

    /// Flattens every topic registered for `role` into questions admitted by `filter`.
    ///
    /// Role names match case-insensitively; several files for the same role are merged.
    pub fn questions_for(
        &self,
        role: &str,
        filter: DifficultyFilter,
    ) -> Result<Vec<Question>, QuestionBankError> {
        let mut matched = self
            .roles
            .iter()
            .filter(|r| r.role.eq_ignore_ascii_case(role))
            .peekable();
        if matched.peek().is_none() {
            return Err(QuestionBankError::UnknownRole(role.to_string()));
        }

        let questions = matched
            .flat_map(|r| r.topics.iter())
            .flat_map(|topic| {
                topic
                    .questions
                    .iter()
                    .filter(move |q| filter.admits(q.difficulty))
                    .map(move |q| Question {
                        id: q.id.clone(),
                        text: q.text.clone(),
                        difficulty: q.difficulty,
                        topic_name: topic.name.clone(),
                        topic_category: topic.category.clone(),
                    })
            })
            .collect();
        Ok(questions)
    }
}

/// The fixed, ordered list of questions for one session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionPlan {
    questions: Vec<Question>,
}

impl SessionPlan {
    /// Upper bound on questions drawn for a single session.
    pub const MAX_QUESTIONS: usize = 8;

    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Shuffles the pool and keeps at most `count` questions.
    pub fn select<R: Rng + ?Sized>(mut pool: Vec<Question>, count: usize, rng: &mut R) -> Self {
        pool.shuffle(rng);
        pool.truncate(count);
        Self { questions: pool }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}
