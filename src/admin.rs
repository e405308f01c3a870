use std::sync::Arc;
use std::time::Duration;

use teloxide::{
    prelude::Requester,
    types::{ChatId, Message},
    Bot,
};
use tracing::instrument;

use crate::database::connection::UserStats;
use crate::notifier::{Notifier, SendReport};
use crate::HandlerResult;

/// Pause between broadcast messages, to stay under the Telegram rate limit.
pub(crate) const BROADCAST_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BroadcastOutcome {
    pub(crate) delivered: usize,
    pub(crate) failed: usize,
}

#[instrument(level = "info", skip(gateway, notifier))]
pub(crate) async fn admin_stats<G: UserStats>(
    bot: Bot,
    msg: Message,
    gateway: Arc<G>,
    notifier: Arc<Notifier<Bot>>,
) -> HandlerResult {
    if !notifier.is_moderator(msg.chat.id) {
        bot.send_message(msg.chat.id, "❌ You are not allowed to use this command.")
            .await?;
        return Ok(());
    }
    notifier.send_bot_stats(gateway.as_ref()).await;
    Ok(())
}

#[instrument(level = "info", skip(gateway, notifier))]
pub(crate) async fn admin_broadcast<G: UserStats>(
    bot: Bot,
    msg: Message,
    message: String,
    gateway: Arc<G>,
    notifier: Arc<Notifier<Bot>>,
) -> HandlerResult {
    if !notifier.is_moderator(msg.chat.id) {
        bot.send_message(msg.chat.id, "❌ You are not allowed to use this command.")
            .await?;
        return Ok(());
    }
    if message.trim().is_empty() {
        bot.send_message(msg.chat.id, "Usage: /admin_broadcast <message>")
            .await?;
        return Ok(());
    }

    let user_ids = match gateway.distinct_user_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            log::error!("failed to list broadcast recipients: {e}");
            bot.send_message(msg.chat.id, "❌ Broadcast failed.").await?;
            return Ok(());
        }
    };

    let outcome = broadcast(&bot, &user_ids, &message, BROADCAST_DELAY).await;
    bot.send_message(
        msg.chat.id,
        format!(
            "📢 Broadcast finished:\n✅ Delivered: {}\n❌ Failed: {}",
            outcome.delivered, outcome.failed,
        ),
    )
    .await?;
    Ok(())
}

/// Sends `text` to every user id, pacing sends with `delay` and tallying
/// failures instead of aborting the batch.
pub(crate) async fn broadcast<S: SendReport>(
    transport: &S,
    user_ids: &[i64],
    text: &str,
    delay: Duration,
) -> BroadcastOutcome {
    let text = format!("📢 Message from the moderator:\n\n{text}");
    let mut delivered = 0;
    let mut failed = 0;
    for (i, user_id) in user_ids.iter().enumerate() {
        match transport.send_plain(ChatId(*user_id), &text).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                failed += 1;
                log::warn!("broadcast to {user_id} failed: {e}");
            }
        }
        if i + 1 < user_ids.len() {
            tokio::time::sleep(delay).await;
        }
    }
    log::info!(
        "broadcast done: {delivered} delivered, {failed} failed of {}",
        user_ids.len()
    );
    BroadcastOutcome { delivered, failed }
}
