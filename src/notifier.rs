use std::error::Error;

use chrono::Utc;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ParseMode};
use teloxide::Bot;

use crate::activity::{self, ClientInfo, UserAction};
use crate::database::connection::UserStats;

pub(crate) type TransportError = Box<dyn Error + Send + Sync>;

/// Value some hosting templates ship as the default `MODERATOR_CHAT_ID`;
/// treated the same as an absent one.
const CHAT_ID_PLACEHOLDER: &str = "your_chat_id_here";

/// Minimal outbound seam so the sink can be exercised without Telegram.
pub(crate) trait SendReport {
    async fn send_html(&self, chat: ChatId, text: &str) -> Result<(), TransportError>;

    async fn send_plain(&self, chat: ChatId, text: &str) -> Result<(), TransportError>;
}

impl SendReport for Bot {
    async fn send_html(&self, chat: ChatId, text: &str) -> Result<(), TransportError> {
        self.send_message(chat, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_plain(&self, chat: ChatId, text: &str) -> Result<(), TransportError> {
        self.send_message(chat, text).await?;
        Ok(())
    }
}

/// Mirrors user activity to the moderator chat, best-effort.
///
/// Every send swallows its own failures: a broken moderator channel must
/// never abort a test transition or a command reply.
pub(crate) struct Notifier<S> {
    transport: S,
    moderator_chat: Option<ChatId>,
}

impl<S: SendReport> Notifier<S> {
    pub(crate) fn new(transport: S, configured_chat: Option<&str>) -> Self {
        let moderator_chat = match configured_chat {
            None => None,
            Some(CHAT_ID_PLACEHOLDER) => {
                log::warn!("MODERATOR_CHAT_ID is the template placeholder, notifications disabled");
                None
            }
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(id) => Some(ChatId(id)),
                Err(_) => {
                    log::warn!("MODERATOR_CHAT_ID '{raw}' is not a chat id, notifications disabled");
                    None
                }
            },
        };
        Self {
            transport,
            moderator_chat,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.moderator_chat.is_some()
    }

    pub(crate) fn is_moderator(&self, chat: ChatId) -> bool {
        self.moderator_chat == Some(chat)
    }

    pub(crate) async fn send_to_moderator(&self, text: &str) {
        let Some(chat) = self.moderator_chat else {
            log::debug!("moderator notifications disabled, dropping a report");
            return;
        };
        if let Err(e) = self.transport.send_html(chat, text).await {
            log::error!("failed to deliver a moderator notification: {e}");
        }
    }

    /// Formats and forwards one user event.
    pub(crate) async fn notify(&self, info: &ClientInfo, action: &UserAction<'_>) {
        self.send_to_moderator(&activity::action_report(info, action))
            .await;
    }

    /// Aggregate usage report for the moderator. A failing gateway query is
    /// logged and swallowed, not retried.
    pub(crate) async fn send_bot_stats<G: UserStats>(&self, gateway: &G) {
        let stats = collect_stats(gateway).await;
        match stats {
            Ok(stats) => {
                let message = format!(
                    "📊 <b>Bot statistics</b>\n\n\
                     👥 Total users: <b>{}</b>\n\
                     🟢 Active in the last 24h: <b>{}</b>\n\
                     ✅ Tests completed: <b>{}</b>\n\
                     ⏰ Updated: {}",
                    stats.total_users,
                    stats.active_last_day,
                    stats.tests_completed,
                    Utc::now().format("%Y-%m-%d %H:%M:%S"),
                );
                self.send_to_moderator(&message).await;
            }
            Err(e) => log::error!("failed to collect bot statistics: {e}"),
        }
    }
}

struct BotStats {
    total_users: i64,
    active_last_day: i64,
    tests_completed: i64,
}

async fn collect_stats<G: UserStats>(gateway: &G) -> Result<BotStats, TransportError> {
    let cutoff = Utc::now() - chrono::Duration::hours(24);
    Ok(BotStats {
        total_users: gateway.count_users().await?,
        active_last_day: gateway.count_active_since(cutoff).await?,
        tests_completed: gateway.sum_tests_completed().await?,
    })
}
