use chrono::{DateTime, Utc};
use teloxide::types::{Message, User};
use teloxide::utils::html;

/// Sentinel region label for language codes outside the lookup table.
pub(crate) const UNKNOWN_REGION: &str = "unknown";

/// Snapshot of the acting user, taken once per inbound update and shared by
/// the console log line, the moderator report and the persistence upsert.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClientInfo {
    pub(crate) user_id: u64,
    pub(crate) username: Option<String>,
    pub(crate) first_name: String,
    pub(crate) last_name: Option<String>,
    /// Unix seconds of the event the snapshot was taken for.
    pub(crate) timestamp: i64,
    pub(crate) region: &'static str,
    pub(crate) pseudo_ip: String,
}

impl ClientInfo {
    pub(crate) fn from_user(user: &User, event_time: DateTime<Utc>) -> Self {
        let timestamp = event_time.timestamp();
        Self {
            user_id: user.id.0,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            timestamp,
            region: region_for_language(user.language_code.as_deref()),
            pseudo_ip: pseudo_ip(user.id.0, timestamp),
        }
    }

    pub(crate) fn from_message(msg: &Message) -> Option<Self> {
        msg.from.as_ref().map(|user| Self::from_user(user, msg.date))
    }

    /// `@username` when the user has one, given+family name otherwise.
    pub(crate) fn display_name(&self) -> String {
        match &self.username {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => match &self.last_name {
                Some(last_name) => format!("{} {}", self.first_name, last_name),
                None => self.first_name.clone(),
            },
        }
    }
}

/// Coarse region estimate from the Telegram language code.
///
/// This is a heuristic, not geolocation; it is rendered with an "estimated"
/// label everywhere it appears.
pub(crate) fn region_for_language(code: Option<&str>) -> &'static str {
    match code {
        Some("ru") => "Russia",
        Some("en") => "USA/UK",
        Some("de") => "Germany",
        Some("fr") => "France",
        Some("es") => "Spain",
        Some("it") => "Italy",
        Some("pt") => "Portugal",
        Some("zh") => "China",
        Some("ja") => "Japan",
        Some("ko") => "Korea",
        Some("ar") => "Arab countries",
        Some("tr") => "Turkey",
        Some("uk") => "Ukraine",
        Some("pl") => "Poland",
        Some("nl") => "Netherlands",
        _ => UNKNOWN_REGION,
    }
}

/// Deterministic per-event token rendered like an IPv4 address.
///
/// Not a network address: the first octet is pinned to the 192-223 band and
/// the rest are modular products of the seed with small odd primes. The same
/// `(user_id, timestamp)` seed always yields the same token.
pub(crate) fn pseudo_ip(user_id: u64, timestamp: i64) -> String {
    let seed = user_id.wrapping_add(timestamp as u64);
    let first = 192 + (seed % 32);
    let second = seed.wrapping_mul(13) % 256;
    let third = seed.wrapping_mul(17) % 256;
    let fourth = seed.wrapping_mul(19) % 256;
    format!("{first}.{second}.{third}.{fourth}")
}

/// A classified user event, carrying only the context that event has.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UserAction<'a> {
    Command(&'a str),
    TestStarted,
    TestCompleted {
        score: u32,
        total: usize,
        duration_secs: u64,
    },
    TextMessage(&'a str),
}

impl UserAction<'_> {
    fn describe(&self) -> String {
        match self {
            UserAction::Command(command) => format!("Command: {command}"),
            UserAction::TestStarted => "Started a test".to_owned(),
            UserAction::TestCompleted { .. } => "Completed a test".to_owned(),
            UserAction::TextMessage(_) => "Sent a message".to_owned(),
        }
    }

    fn score(&self) -> Option<(u32, usize)> {
        match self {
            UserAction::TestCompleted { score, total, .. } => Some((*score, *total)),
            _ => None,
        }
    }

    fn duration_secs(&self) -> Option<u64> {
        match self {
            UserAction::TestCompleted { duration_secs, .. } => Some(*duration_secs),
            _ => None,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            UserAction::TextMessage(text) => Some(text),
            _ => None,
        }
    }
}

/// Plain console line for one user event.
pub(crate) fn log_line(info: &ClientInfo, action: &UserAction<'_>) -> String {
    let mut line = format!(
        "[{}] 👤 USER: {} (ID: {}) | 🌍 REGION (est.): {} | 🖥️ IP: {} | 📱 ACTION: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
        info.display_name(),
        info.user_id,
        info.region,
        info.pseudo_ip,
        action.describe(),
    );
    if let Some((score, total)) = action.score() {
        line.push_str(&format!(" | 📊 SCORE: {score}/{total}"));
    }
    line
}

/// HTML payload for the moderator channel. Optional fields are rendered only
/// when the action carries them.
pub(crate) fn action_report(info: &ClientInfo, action: &UserAction<'_>) -> String {
    let event_time = DateTime::from_timestamp(info.timestamp, 0).unwrap_or_else(Utc::now);
    let mut message = String::from("👤 <b>New user action</b>\n");
    message.push_str(&format!(
        "⏰ <b>Time:</b> {}\n",
        event_time.format("%Y-%m-%d %H:%M:%S")
    ));
    message.push_str(&format!(
        "👤 <b>User:</b> {}\n",
        html::escape(&info.display_name())
    ));
    message.push_str(&format!("🆔 <b>ID:</b> <code>{}</code>\n", info.user_id));
    message.push_str(&format!("🌍 <b>Region (est.):</b> {}\n", info.region));
    message.push_str(&format!(
        "📱 <b>Action:</b> {}\n",
        html::escape(&action.describe())
    ));
    message.push_str(&format!("🖥️ <b>IP:</b> <code>{}</code>\n", info.pseudo_ip));

    if let Some((score, total)) = action.score() {
        message.push_str(&format!("📊 <b>Result:</b> {score}/{total}\n"));
    }
    if let Some(duration) = action.duration_secs() {
        message.push_str(&format!("⏱️ <b>Test duration:</b> {duration} sec\n"));
    }
    if let Some(text) = action.text() {
        message.push_str(&format!("✍️ <b>Text:</b> {}\n", html::escape(text)));
    }

    message
}
