use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// A single multiple-choice question as stored in the bank.
///
/// Questions are immutable once loaded; a running test works on a snapshot
/// of sampled `Question`s and never writes back.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Question {
    uuid: Uuid,
    prompt: String,
    options: [String; 4],
    correct_index: usize,
    explanation: String,
    study_link: String,
    category: Category,
    difficulty: Difficulty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum QuestionError {
    #[error("correct answer index {0} is out of range (expected 0-3)")]
    CorrectIndexOutOfRange(i64),
    #[error("unknown question category '{0}'")]
    UnknownCategory(String),
    #[error("unknown question difficulty '{0}'")]
    UnknownDifficulty(String),
}

impl Question {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        uuid: Uuid,
        prompt: String,
        options: [String; 4],
        correct_index: usize,
        explanation: String,
        study_link: String,
        category: Category,
        difficulty: Difficulty,
    ) -> Result<Self, QuestionError> {
        if correct_index > 3 {
            return Err(QuestionError::CorrectIndexOutOfRange(correct_index as i64));
        }
        Ok(Self {
            uuid,
            prompt,
            options,
            correct_index,
            explanation,
            study_link,
            category,
            difficulty,
        })
    }

    pub(crate) fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub(crate) fn prompt(&self) -> &str {
        &self.prompt
    }

    pub(crate) fn options(&self) -> &[String; 4] {
        &self.options
    }

    pub(crate) fn correct_index(&self) -> usize {
        self.correct_index
    }

    pub(crate) fn explanation(&self) -> &str {
        &self.explanation
    }

    pub(crate) fn study_link(&self) -> &str {
        &self.study_link
    }

    pub(crate) fn category(&self) -> Category {
        self.category
    }

    pub(crate) fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}

/// Closed set of question categories carried over from the bank schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Category {
    Algorithms,
    Programming,
    Networks,
    Databases,
    OperatingSystems,
    DataStructures,
    Fundamentals,
    Informatics,
    ProgrammingLanguages,
    InformationTheory,
    ComputerScience,
}

impl Category {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Category::Algorithms => "algorithms",
            Category::Programming => "programming",
            Category::Networks => "networks",
            Category::Databases => "databases",
            Category::OperatingSystems => "operating_systems",
            Category::DataStructures => "data_structures",
            Category::Fundamentals => "fundamentals",
            Category::Informatics => "informatics",
            Category::ProgrammingLanguages => "programming_languages",
            Category::InformationTheory => "information_theory",
            Category::ComputerScience => "computer_science",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Fundamentals
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "algorithms" => Ok(Category::Algorithms),
            "programming" => Ok(Category::Programming),
            "networks" => Ok(Category::Networks),
            "databases" => Ok(Category::Databases),
            "operating_systems" => Ok(Category::OperatingSystems),
            "data_structures" => Ok(Category::DataStructures),
            "fundamentals" => Ok(Category::Fundamentals),
            "informatics" => Ok(Category::Informatics),
            "programming_languages" => Ok(Category::ProgrammingLanguages),
            "information_theory" => Ok(Category::InformationTheory),
            "computer_science" => Ok(Category::ComputerScience),
            other => Err(QuestionError::UnknownCategory(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(QuestionError::UnknownDifficulty(other.to_owned())),
        }
    }
}

/// Raw `questions` row; decoded into a [`Question`] with validation.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QuestionRow {
    pub(crate) uuid: Uuid,
    pub(crate) prompt: String,
    pub(crate) option_a: String,
    pub(crate) option_b: String,
    pub(crate) option_c: String,
    pub(crate) option_d: String,
    pub(crate) correct_index: i16,
    pub(crate) explanation: String,
    pub(crate) study_link: String,
    pub(crate) category: String,
    pub(crate) difficulty: String,
}

impl TryFrom<QuestionRow> for Question {
    type Error = QuestionError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let correct_index = usize::try_from(row.correct_index)
            .map_err(|_| QuestionError::CorrectIndexOutOfRange(i64::from(row.correct_index)))?;
        Question::new(
            row.uuid,
            row.prompt,
            [row.option_a, row.option_b, row.option_c, row.option_d],
            correct_index,
            row.explanation,
            row.study_link,
            row.category.parse()?,
            row.difficulty.parse()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(correct_index: i16, category: &str, difficulty: &str) -> QuestionRow {
        QuestionRow {
            uuid: Uuid::new_v4(),
            prompt: "What does CPU stand for?".into(),
            option_a: "Central Processing Unit".into(),
            option_b: "Computer Personal Unit".into(),
            option_c: "Central Process Utility".into(),
            option_d: "Control Processing Unit".into(),
            correct_index,
            explanation: "CPU is the central processing unit.".into(),
            study_link: "https://en.wikipedia.org/wiki/Central_processing_unit".into(),
            category: category.into(),
            difficulty: difficulty.into(),
        }
    }

    #[test]
    fn decodes_a_valid_row() {
        let question = Question::try_from(row(0, "fundamentals", "easy")).unwrap();
        assert_eq!(question.correct_index(), 0);
        assert_eq!(question.category(), Category::Fundamentals);
        assert_eq!(question.difficulty(), Difficulty::Easy);
        assert_eq!(question.options().len(), 4);
    }

    #[test]
    fn rejects_out_of_range_correct_index() {
        assert_eq!(
            Question::try_from(row(4, "fundamentals", "easy")),
            Err(QuestionError::CorrectIndexOutOfRange(4))
        );
    }

    #[test]
    fn rejects_unknown_category() {
        assert!(matches!(
            Question::try_from(row(1, "astrology", "easy")),
            Err(QuestionError::UnknownCategory(c)) if c == "astrology"
        ));
    }

    #[test]
    fn category_names_round_trip() {
        for category in [
            Category::Algorithms,
            Category::Programming,
            Category::Networks,
            Category::Databases,
            Category::OperatingSystems,
            Category::DataStructures,
            Category::Fundamentals,
            Category::Informatics,
            Category::ProgrammingLanguages,
            Category::InformationTheory,
            Category::ComputerScience,
        ] {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn defaults_match_the_bank_schema() {
        assert_eq!(Category::default(), Category::Fundamentals);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
    }
}
