use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::database::question::Question;

/// Number of questions sampled for one test.
pub(crate) const QUIZ_LENGTH: usize = 10;

/// A session that has not answered anything for this long no longer blocks
/// the user from starting over.
pub(crate) const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum SessionError {
    #[error("a test is already in progress for this user")]
    AlreadyInProgress,
    #[error("answer index {0} is out of range (expected 0-3)")]
    InvalidOption(usize),
    #[error("no active question for this user")]
    NoActiveQuestion,
    #[error("the question bank returned no questions")]
    EmptyQuestionBank,
}

/// One recorded answer. Appended exactly once per question, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AnswerRecord {
    pub(crate) question_index: usize,
    pub(crate) selected: usize,
    pub(crate) correct: bool,
    pub(crate) answered_at: DateTime<Utc>,
}

/// Everything a handler needs to render the current question.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionCard {
    pub(crate) number: usize,
    pub(crate) total: usize,
    pub(crate) prompt: String,
    pub(crate) options: [String; 4],
}

/// Outcome of a submitted answer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AnswerStep {
    Next(QuestionCard),
    Finished(QuizReport),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReviewEntry {
    pub(crate) number: usize,
    pub(crate) correct: bool,
    pub(crate) explanation: String,
    pub(crate) study_link: String,
}

/// Final snapshot of a completed test; the session itself is gone by the
/// time the caller sees this.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuizReport {
    pub(crate) score: u32,
    pub(crate) total: usize,
    pub(crate) duration_secs: u64,
    pub(crate) entries: Vec<ReviewEntry>,
}

impl QuizReport {
    pub(crate) fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.score as f64 / self.total as f64) * 100.0).round() as u32
    }

    pub(crate) fn grade(&self) -> Grade {
        Grade::from_percentage(self.percentage())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grade {
    Excellent,
    Good,
    Satisfactory,
    NeedsWork,
}

impl Grade {
    pub(crate) fn from_percentage(percentage: u32) -> Self {
        if percentage >= 90 {
            Grade::Excellent
        } else if percentage >= 70 {
            Grade::Good
        } else if percentage >= 50 {
            Grade::Satisfactory
        } else {
            Grade::NeedsWork
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Grade::Excellent => "Excellent! 🏆",
            Grade::Good => "Good! 👍",
            Grade::Satisfactory => "Satisfactory 👌",
            Grade::NeedsWork => "Needs more study 📚",
        };
        f.write_str(label)
    }
}

/// One user's attempt at a fixed-length test.
///
/// Invariants: `answers.len() == current_index`, `score` counts the correct
/// answers, and the session is in progress iff `current_index < questions.len()`.
#[derive(Debug)]
pub(crate) struct QuizSession {
    user_id: u64,
    questions: Vec<Question>,
    current_index: usize,
    answers: Vec<AnswerRecord>,
    score: u32,
    started_at: DateTime<Utc>,
    last_activity: Instant,
}

impl QuizSession {
    pub(crate) fn start(user_id: u64, questions: Vec<Question>) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::EmptyQuestionBank);
        }
        Ok(Self {
            user_id,
            questions,
            current_index: 0,
            answers: Vec::new(),
            score: 0,
            started_at: Utc::now(),
            last_activity: Instant::now(),
        })
    }

    pub(crate) fn user_id(&self) -> u64 {
        self.user_id
    }

    pub(crate) fn in_progress(&self) -> bool {
        self.current_index < self.questions.len()
    }

    pub(crate) fn current_index(&self) -> usize {
        self.current_index
    }

    pub(crate) fn score(&self) -> u32 {
        self.score
    }

    pub(crate) fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub(crate) fn current_question(&self) -> Result<&Question, SessionError> {
        self.questions
            .get(self.current_index)
            .ok_or(SessionError::NoActiveQuestion)
    }

    pub(crate) fn current_card(&self) -> Result<QuestionCard, SessionError> {
        let question = self.current_question()?;
        Ok(QuestionCard {
            number: self.current_index + 1,
            total: self.questions.len(),
            prompt: question.prompt().to_owned(),
            options: question.options().clone(),
        })
    }

    /// Evaluates one answer and advances the session.
    ///
    /// An out-of-range selection leaves the session untouched. The terminal
    /// transition is reported exactly once, on the final answer.
    pub(crate) fn submit_answer(&mut self, selected: usize) -> Result<SubmitOutcome, SessionError> {
        if selected > 3 {
            return Err(SessionError::InvalidOption(selected));
        }
        let question = self.current_question()?;
        let correct = selected == question.correct_index();

        self.answers.push(AnswerRecord {
            question_index: self.current_index,
            selected,
            correct,
            answered_at: Utc::now(),
        });
        if correct {
            self.score += 1;
        }
        self.current_index += 1;
        self.last_activity = Instant::now();

        if self.current_index >= self.questions.len() {
            Ok(SubmitOutcome::Finished)
        } else {
            Ok(SubmitOutcome::Continue)
        }
    }

    /// Whole seconds since the test started, rounded.
    pub(crate) fn elapsed_seconds(&self) -> u64 {
        let millis = (Utc::now() - self.started_at).num_milliseconds().max(0);
        ((millis as f64) / 1000.0).round() as u64
    }

    fn into_report(self) -> QuizReport {
        let duration_secs = self.elapsed_seconds();
        let entries = self
            .questions
            .iter()
            .zip(&self.answers)
            .enumerate()
            .map(|(i, (question, answer))| ReviewEntry {
                number: i + 1,
                correct: answer.correct,
                explanation: question.explanation().to_owned(),
                study_link: question.study_link().to_owned(),
            })
            .collect();
        QuizReport {
            score: self.score,
            total: self.questions.len(),
            duration_secs,
            entries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitOutcome {
    Continue,
    Finished,
}

/// In-memory registry of active sessions, at most one per user.
///
/// The map mutex is the only cross-user shared state; every operation locks,
/// transitions, and returns owned data, so no guard ever crosses an await.
#[derive(Debug)]
pub(crate) struct SessionRegistry {
    sessions: Mutex<HashMap<u64, QuizSession>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }

    pub(crate) fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Admits a new test for the user, or rejects it if one is already live.
    ///
    /// A session that sat idle past the timeout is evicted here instead of
    /// holding the slot forever.
    pub(crate) fn start_quiz(
        &self,
        user_id: u64,
        questions: Vec<Question>,
    ) -> Result<QuestionCard, SessionError> {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");

        if let Some(existing) = sessions.get(&user_id) {
            if existing.in_progress() && existing.idle_for() < self.idle_timeout {
                return Err(SessionError::AlreadyInProgress);
            }
            log::warn!(
                "evicting idle session for user {} at question {}",
                user_id,
                existing.current_index() + 1
            );
            sessions.remove(&user_id);
        }

        let session = QuizSession::start(user_id, questions)?;
        let card = session.current_card()?;
        log::info!(
            "user {} starts a test of {} questions",
            session.user_id(),
            card.total
        );
        sessions.insert(user_id, session);
        Ok(card)
    }

    /// Runs one answer through the user's session. On the terminal answer
    /// the session is removed in the same locked operation and its report
    /// returned.
    pub(crate) fn submit_answer(
        &self,
        user_id: u64,
        selected: usize,
    ) -> Result<AnswerStep, SessionError> {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");

        let session = sessions
            .get_mut(&user_id)
            .ok_or(SessionError::NoActiveQuestion)?;
        match session.submit_answer(selected)? {
            SubmitOutcome::Continue => Ok(AnswerStep::Next(session.current_card()?)),
            SubmitOutcome::Finished => {
                let session = sessions
                    .remove(&user_id)
                    .expect("finished session vanished under the lock");
                Ok(AnswerStep::Finished(session.into_report()))
            }
        }
    }

    pub(crate) fn in_progress(&self, user_id: u64) -> bool {
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .get(&user_id)
            .is_some_and(QuizSession::in_progress)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::database::question::{Category, Difficulty};

    fn question(correct_index: usize) -> Question {
        Question::new(
            Uuid::new_v4(),
            "Which option is right?".into(),
            ["a", "b", "c", "d"].map(String::from),
            correct_index,
            "Because it is.".into(),
            "https://example.com/study".into(),
            Category::Fundamentals,
            Difficulty::Easy,
        )
        .unwrap()
    }

    fn bank(correct_indices: &[usize]) -> Vec<Question> {
        correct_indices.iter().copied().map(question).collect()
    }

    const CORRECT: [usize; 10] = [1, 0, 2, 3, 1, 0, 0, 2, 3, 1];

    #[test]
    fn perfect_run_scores_full_marks() {
        let registry = SessionRegistry::new();
        registry.start_quiz(7, bank(&CORRECT)).unwrap();

        let mut last = None;
        for answer in CORRECT {
            last = Some(registry.submit_answer(7, answer).unwrap());
        }
        let report = match last {
            Some(AnswerStep::Finished(report)) => report,
            other => panic!("expected a finished test, got {other:?}"),
        };
        assert_eq!(report.score, 10);
        assert_eq!(report.total, 10);
        assert_eq!(report.percentage(), 100);
        assert_eq!(report.grade(), Grade::Excellent);
        assert!(report.entries.iter().all(|e| e.correct));
        assert!(!registry.in_progress(7));
    }

    #[test]
    fn wrong_answers_still_complete_and_clear_the_session() {
        let registry = SessionRegistry::new();
        registry.start_quiz(7, bank(&CORRECT)).unwrap();

        let answers = [0, 1, 0, 0, 0, 1, 1, 0, 0, 0];
        let mut last = None;
        for answer in answers {
            last = Some(registry.submit_answer(7, answer).unwrap());
        }
        let report = match last {
            Some(AnswerStep::Finished(report)) => report,
            other => panic!("expected a finished test, got {other:?}"),
        };
        assert_eq!(report.score, 0);
        assert_eq!(report.grade(), Grade::NeedsWork);
        assert!(!registry.in_progress(7));
        // the slot is free again
        registry.start_quiz(7, bank(&CORRECT)).unwrap();
    }

    #[test]
    fn answers_track_the_cursor_and_score() {
        let mut session = QuizSession::start(1, bank(&CORRECT)).unwrap();
        let answers = [1, 1, 2, 0, 1];
        let mut expected_score = 0;
        for (i, answer) in answers.into_iter().enumerate() {
            session.submit_answer(answer).unwrap();
            if answer == CORRECT[i] {
                expected_score += 1;
            }
            assert_eq!(session.answers().len(), session.current_index());
            assert_eq!(session.score(), expected_score);
            assert_eq!(
                session.score() as usize,
                session.answers().iter().filter(|a| a.correct).count()
            );
        }
        assert!(session.in_progress());
    }

    #[test]
    fn out_of_range_answer_changes_nothing() {
        let mut session = QuizSession::start(1, bank(&CORRECT)).unwrap();
        session.submit_answer(1).unwrap();

        assert_eq!(session.submit_answer(4), Err(SessionError::InvalidOption(4)));
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.answers().len(), 1);
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn submitting_after_the_last_question_fails() {
        let mut session = QuizSession::start(1, bank(&[0])).unwrap();
        assert_eq!(session.submit_answer(0), Ok(SubmitOutcome::Finished));
        assert!(!session.in_progress());
        assert_eq!(session.submit_answer(0), Err(SessionError::NoActiveQuestion));
        assert_eq!(session.current_question(), Err(SessionError::NoActiveQuestion));
    }

    #[test]
    fn second_start_is_rejected_while_in_progress() {
        let registry = SessionRegistry::new();
        registry.start_quiz(7, bank(&CORRECT)).unwrap();
        registry.submit_answer(7, 1).unwrap();

        assert_eq!(
            registry.start_quiz(7, bank(&CORRECT)),
            Err(SessionError::AlreadyInProgress)
        );
        // the first session is unaffected
        match registry.submit_answer(7, 0).unwrap() {
            AnswerStep::Next(card) => assert_eq!(card.number, 3),
            other => panic!("expected the next question, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_starts_admit_exactly_one() {
        let registry = Arc::new(SessionRegistry::new());
        let admitted: usize = std::thread::scope(|scope| {
            (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    scope.spawn(move || registry.start_quiz(7, bank(&CORRECT)).is_ok())
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|handle| handle.join().unwrap() as usize)
                .sum()
        });
        assert_eq!(admitted, 1);
        assert!(registry.in_progress(7));
    }

    #[test]
    fn empty_bank_is_rejected_distinctly() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.start_quiz(7, Vec::new()),
            Err(SessionError::EmptyQuestionBank)
        );
        assert!(!registry.in_progress(7));
    }

    #[test]
    fn unknown_user_has_no_active_question() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.submit_answer(42, 0),
            Err(SessionError::NoActiveQuestion)
        );
    }

    #[test]
    fn idle_session_is_evicted_on_the_next_start() {
        let registry = SessionRegistry::with_idle_timeout(Duration::from_millis(5));
        registry.start_quiz(7, bank(&CORRECT)).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let card = registry.start_quiz(7, bank(&CORRECT)).unwrap();
        assert_eq!(card.number, 1);
    }

    #[test]
    fn first_card_describes_the_first_question() {
        let registry = SessionRegistry::new();
        let card = registry.start_quiz(7, bank(&CORRECT)).unwrap();
        assert_eq!(card.number, 1);
        assert_eq!(card.total, 10);
        assert_eq!(card.options.len(), 4);
    }

    #[test]
    fn grade_tiers_follow_the_percentage_bands() {
        assert_eq!(Grade::from_percentage(100), Grade::Excellent);
        assert_eq!(Grade::from_percentage(90), Grade::Excellent);
        assert_eq!(Grade::from_percentage(89), Grade::Good);
        assert_eq!(Grade::from_percentage(70), Grade::Good);
        assert_eq!(Grade::from_percentage(69), Grade::Satisfactory);
        assert_eq!(Grade::from_percentage(50), Grade::Satisfactory);
        assert_eq!(Grade::from_percentage(49), Grade::NeedsWork);
        assert_eq!(Grade::from_percentage(0), Grade::NeedsWork);
    }

    #[test]
    fn percentage_rounds_to_the_nearest_point() {
        let report = QuizReport {
            score: 1,
            total: 3,
            duration_secs: 0,
            entries: Vec::new(),
        };
        assert_eq!(report.percentage(), 33);
        let report = QuizReport {
            score: 2,
            total: 3,
            duration_secs: 0,
            entries: Vec::new(),
        };
        assert_eq!(report.percentage(), 67);
    }

    #[test]
    fn answer_timestamps_are_ordered() {
        let mut session = QuizSession::start(1, bank(&CORRECT)).unwrap();
        session.submit_answer(0).unwrap();
        session.submit_answer(1).unwrap();
        let answers = session.answers();
        assert!(answers[0].answered_at <= answers[1].answered_at);
        assert_eq!(answers[0].question_index, 0);
        assert_eq!(answers[1].question_index, 1);
        assert_eq!(answers[1].selected, 1);
    }
}
