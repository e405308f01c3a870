use std::sync::Arc;

use chrono::Utc;
use teloxide::{
    dispatching::dialogue::GetChatId,
    payloads::{AnswerCallbackQuerySetters, SendMessageSetters},
    prelude::Requester,
    types::{CallbackQuery, ChatId, Message},
    Bot,
};
use tracing::instrument;

use crate::activity::{self, ClientInfo, UserAction};
use crate::database::connection::{LogActivity, SampleQuestions};
use crate::keyboard::answers_keyboard;
use crate::notifier::Notifier;
use crate::session::{AnswerStep, QuestionCard, QuizReport, SessionError, SessionRegistry, QUIZ_LENGTH};
use crate::{commands, HandlerResult};

#[instrument(level = "info", skip(gateway, sessions, notifier))]
pub(crate) async fn start_test<G: SampleQuestions + LogActivity>(
    bot: Bot,
    msg: Message,
    gateway: Arc<G>,
    sessions: Arc<SessionRegistry>,
    notifier: Arc<Notifier<Bot>>,
) -> HandlerResult {
    let Some(info) = ClientInfo::from_message(&msg) else {
        return Ok(());
    };
    commands::track_command(gateway.as_ref(), notifier.as_ref(), &info, "/test").await;
    log::info!("{}", activity::log_line(&info, &UserAction::TestStarted));
    notifier.notify(&info, &UserAction::TestStarted).await;

    let questions = match gateway.sample(QUIZ_LENGTH as i64).await {
        Ok(questions) => questions,
        Err(e) => {
            log::error!("failed to sample questions: {e}");
            bot.send_message(
                msg.chat.id,
                "❌ Failed to load questions. Please try again later.",
            )
            .await?;
            return Ok(());
        }
    };
    if questions.is_empty() {
        bot.send_message(
            msg.chat.id,
            "❌ There are no questions in the bank. Please contact the moderator.",
        )
        .await?;
        return Ok(());
    }

    match sessions.start_quiz(info.user_id, questions) {
        Ok(card) => send_question(&bot, msg.chat.id, &card).await?,
        Err(SessionError::AlreadyInProgress) => {
            bot.send_message(
                msg.chat.id,
                "⚠️ You already have a test in progress! Finish it before starting a new one.",
            )
            .await?;
        }
        Err(e) => {
            log::error!("failed to admit a test for {}: {e}", info.user_id);
            bot.send_message(msg.chat.id, "❌ Could not start a test. Please try again later.")
                .await?;
        }
    }
    Ok(())
}

#[instrument(level = "info", skip(gateway, sessions, notifier))]
pub(crate) async fn take_answer<G: LogActivity>(
    bot: Bot,
    q: CallbackQuery,
    gateway: Arc<G>,
    sessions: Arc<SessionRegistry>,
    notifier: Arc<Notifier<Bot>>,
) -> HandlerResult {
    let Some(chat_id) = q.chat_id() else {
        bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };
    let user_id = q.from.id.0;

    let Some(selected) = q.data.as_deref().and_then(|data| data.parse::<usize>().ok()) else {
        bot.answer_callback_query(&q.id)
            .text("Invalid answer option.")
            .await?;
        return Ok(());
    };

    match sessions.submit_answer(user_id, selected) {
        Ok(AnswerStep::Next(card)) => {
            bot.answer_callback_query(&q.id).await?;
            send_question(&bot, chat_id, &card).await?;
        }
        Ok(AnswerStep::Finished(report)) => {
            bot.answer_callback_query(&q.id).await?;

            if let Err(e) = gateway
                .record_test_completion(user_id as i64, report.score)
                .await
            {
                log::error!("failed to record test completion for {user_id}: {e}");
            }
            let info = ClientInfo::from_user(&q.from, Utc::now());
            let action = UserAction::TestCompleted {
                score: report.score,
                total: report.total,
                duration_secs: report.duration_secs,
            };
            log::info!("{}", activity::log_line(&info, &action));
            notifier.notify(&info, &action).await;

            bot.send_message(chat_id, results_message(&report)).await?;
        }
        Err(SessionError::InvalidOption(_)) => {
            bot.answer_callback_query(&q.id)
                .text("Invalid answer option.")
                .await?;
        }
        Err(SessionError::NoActiveQuestion) => {
            bot.answer_callback_query(&q.id)
                .text("No active test. Start a new one with /test")
                .await?;
        }
        Err(e) => {
            log::error!("failed to process an answer from {user_id}: {e}");
            bot.answer_callback_query(&q.id).await?;
        }
    }
    Ok(())
}

/// Fallback for plain text messages: mirror them to the moderator and nudge
/// the user back to the buttons while a test is running.
#[instrument(level = "info", skip(sessions, notifier))]
pub(crate) async fn free_text(
    bot: Bot,
    msg: Message,
    sessions: Arc<SessionRegistry>,
    notifier: Arc<Notifier<Bot>>,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    // commands are routed by the dispatch tree, not here
    if text.starts_with('/') {
        return Ok(());
    }
    let Some(info) = ClientInfo::from_message(&msg) else {
        return Ok(());
    };

    let action = UserAction::TextMessage(text);
    log::info!("{}", activity::log_line(&info, &action));
    notifier.notify(&info, &action).await;

    if sessions.in_progress(info.user_id) {
        bot.send_message(msg.chat.id, "Please use the answer buttons to pick an option.")
            .await?;
    }
    Ok(())
}

async fn send_question(bot: &Bot, chat_id: ChatId, card: &QuestionCard) -> HandlerResult {
    bot.send_message(chat_id, question_message(card))
        .reply_markup(answers_keyboard())
        .await?;
    Ok(())
}

pub(crate) fn question_message(card: &QuestionCard) -> String {
    format!(
        "❓ Question {}/{}:\n\n{}\n\nAnswer options:\n1. {}\n2. {}\n3. {}\n4. {}\n\n\
         Pick the number of the correct answer (1-4):",
        card.number,
        card.total,
        card.prompt,
        card.options[0],
        card.options[1],
        card.options[2],
        card.options[3],
    )
}

pub(crate) fn results_message(report: &QuizReport) -> String {
    let mut message = format!(
        "🎯 Test complete!\n\nYour result: {} of {} ({}%)\n\nGrade: {}\n\n",
        report.score,
        report.total,
        report.percentage(),
        report.grade(),
    );
    message.push_str("📖 Study material:\n\n");
    for entry in &report.entries {
        let emoji = if entry.correct { "✅" } else { "❌" };
        message.push_str(&format!(
            "{} Question {}: {}\n🔗 Study link: {}\n\n",
            emoji, entry.number, entry.explanation, entry.study_link,
        ));
    }
    message.push_str("Use /test to start a new test.");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ReviewEntry;

    #[test]
    fn question_message_numbers_the_options() {
        let card = QuestionCard {
            number: 3,
            total: 10,
            prompt: "What is a stack?".into(),
            options: ["LIFO", "FIFO", "Tree", "Graph"].map(String::from),
        };
        let text = question_message(&card);
        assert!(text.starts_with("❓ Question 3/10:"));
        assert!(text.contains("1. LIFO"));
        assert!(text.contains("4. Graph"));
    }

    #[test]
    fn results_message_reports_score_grade_and_material() {
        let report = QuizReport {
            score: 10,
            total: 10,
            duration_secs: 61,
            entries: vec![
                ReviewEntry {
                    number: 1,
                    correct: true,
                    explanation: "A stack is LIFO.".into(),
                    study_link: "https://example.com/stack".into(),
                },
                ReviewEntry {
                    number: 2,
                    correct: false,
                    explanation: "A queue is FIFO.".into(),
                    study_link: "https://example.com/queue".into(),
                },
            ],
        };
        let text = results_message(&report);
        assert!(text.contains("Your result: 10 of 10 (100%)"));
        assert!(text.contains("Excellent! 🏆"));
        assert!(text.contains("✅ Question 1: A stack is LIFO."));
        assert!(text.contains("❌ Question 2: A queue is FIFO."));
        assert!(text.contains("https://example.com/queue"));
    }
}
