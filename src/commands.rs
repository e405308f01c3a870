use std::sync::Arc;

use teloxide::{
    prelude::Requester, types::Message, utils::command::BotCommands, Bot,
};
use tracing::instrument;

use crate::activity::{self, ClientInfo, UserAction};
use crate::database::connection::{LogActivity, UserStats};
use crate::notifier::Notifier;
use crate::session::QUIZ_LENGTH;
use crate::HandlerResult;

#[derive(Debug, Clone, BotCommands)]
#[command(rename_rule = "snake_case")]
pub(crate) enum Command {
    #[command(description = "start working with the bot.")]
    Start,
    #[command(description = "begin a new test of 10 random questions.")]
    Test,
    #[command(description = "show your statistics.")]
    Stats,
    #[command(description = "display help.")]
    Help,
    #[command(description = "moderator: bot usage statistics.")]
    AdminStats,
    #[command(description = "moderator: broadcast a message to all users.")]
    AdminBroadcast(String),
}

const WELCOME_MESSAGE: &str = "🎓 Welcome to the computer science test bot!\n\n\
I will help you check your knowledge of computer science.\n\n\
Available commands:\n\
/start - start working with the bot\n\
/test - begin a new test\n\
/stats - show your statistics\n\
/help - display help\n\n\
Press /test to begin!";

const HELP_MESSAGE: &str = "📚 Bot help:\n\n\
/test - begin a new test (10 random questions)\n\
/start - restart the bot\n\
/stats - show your statistics\n\n\
During a test:\n\
- pick an answer option from 1 to 4\n\
- only one test can run at a time\n\
- at the end you get your score and study material";

/// Console line, durable command log and moderator report for one command.
/// Persistence and notification failures are logged and dropped here; they
/// never reach the command flow.
pub(crate) async fn track_command<G: LogActivity>(
    gateway: &G,
    notifier: &Notifier<Bot>,
    info: &ClientInfo,
    command: &str,
) {
    let action = UserAction::Command(command);
    log::info!("{}", activity::log_line(info, &action));
    if let Err(e) = gateway.log_command(info, command).await {
        log::error!("failed to persist command log: {e}");
    }
    notifier.notify(info, &action).await;
}

#[instrument(level = "info", skip(gateway, notifier))]
pub(crate) async fn start<G: LogActivity>(
    bot: Bot,
    msg: Message,
    gateway: Arc<G>,
    notifier: Arc<Notifier<Bot>>,
) -> HandlerResult {
    let Some(info) = ClientInfo::from_message(&msg) else {
        return Ok(());
    };
    track_command(gateway.as_ref(), notifier.as_ref(), &info, "/start").await;

    bot.send_message(msg.chat.id, WELCOME_MESSAGE).await?;
    Ok(())
}

#[instrument(level = "info", skip(gateway, notifier))]
pub(crate) async fn help<G: LogActivity>(
    bot: Bot,
    msg: Message,
    gateway: Arc<G>,
    notifier: Arc<Notifier<Bot>>,
) -> HandlerResult {
    let Some(info) = ClientInfo::from_message(&msg) else {
        return Ok(());
    };
    track_command(gateway.as_ref(), notifier.as_ref(), &info, "/help").await;

    bot.send_message(msg.chat.id, HELP_MESSAGE).await?;
    Ok(())
}

#[instrument(level = "info", skip(gateway, notifier))]
pub(crate) async fn stats<G: LogActivity + UserStats>(
    bot: Bot,
    msg: Message,
    gateway: Arc<G>,
    notifier: Arc<Notifier<Bot>>,
) -> HandlerResult {
    let Some(info) = ClientInfo::from_message(&msg) else {
        return Ok(());
    };
    track_command(gateway.as_ref(), notifier.as_ref(), &info, "/stats").await;

    match gateway.find_user(info.user_id as i64).await {
        Ok(Some(record)) => {
            let average = if record.tests_completed > 0 {
                (record.total_score as f64 / record.tests_completed as f64).round() as i64
            } else {
                0
            };
            bot.send_message(
                msg.chat.id,
                format!(
                    "📊 Your statistics:\n\n\
                     ✅ Tests completed: {}\n\
                     📈 Average score: {average}/{QUIZ_LENGTH}\n\
                     🔄 Commands issued: {}\n\
                     ⏰ Last activity: {}\n\
                     🖥️ Last pseudo-IP: {}\n\n\
                     Keep learning! 🎓",
                    record.tests_completed,
                    record.commands_used,
                    record.last_activity.format("%Y-%m-%d %H:%M:%S UTC"),
                    record.ip_address,
                ),
            )
            .await?;
        }
        Ok(None) => {
            bot.send_message(
                msg.chat.id,
                "📊 You have no statistics yet. Take a test with /test",
            )
            .await?;
        }
        Err(e) => {
            log::error!("failed to load statistics for {}: {e}", info.user_id);
            bot.send_message(msg.chat.id, "❌ Failed to load your statistics.")
                .await?;
        }
    }
    Ok(())
}
