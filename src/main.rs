use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateHandler;
use teloxide::error_handlers::IgnoringErrorHandlerSafe;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks::{self, Options};
use tracing::level_filters;
use tracing_subscriber::fmt::format::FmtSpan;
use url::Url;

mod activity;
mod admin;
mod commands;
mod database;
mod keyboard;
mod notifier;
mod runner;
mod session;

use commands::Command;
use database::connection::Connection;
use notifier::Notifier;
use session::SessionRegistry;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let rust_log = std::env::var("LOG_LEVEL").unwrap_or("info".into());
    tracing_subscriber::fmt()
        .with_max_level(level_filters::LevelFilter::from_level(
            rust_log.parse().expect("LOG_LEVEL can't be parsed."),
        ))
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_ansi(true)
        .with_line_number(true)
        .with_target(false)
        .init();

    let connection_string = std::env::var("DATABASE_URL").expect("DATABASE_URL should be set.");
    let connection =
        Arc::new(Connection::connect(std::borrow::Cow::Owned(connection_string)).await);
    connection.run_migrations().await;

    let teloxide_token = std::env::var("TELOXIDE_TOKEN").expect("TELOXIDE_TOKEN should be set.");
    let bot = Bot::new(teloxide_token);
    log::info!("Starting bot...");

    let moderator_chat = std::env::var("MODERATOR_CHAT_ID").ok();
    let notifier = Arc::new(Notifier::new(bot.clone(), moderator_chat.as_deref()));
    log::info!("Moderator notifications enabled: {}", notifier.is_enabled());
    let sessions = Arc::new(SessionRegistry::new());

    notifier
        .send_to_moderator("🤖 <b>Bot is up and ready!</b>")
        .await;
    notifier.send_bot_stats(connection.as_ref()).await;

    let webhook_url = std::env::var("WEBHOOK_URL")
        .map(|d| d.parse::<Url>().expect("WEBHOOK_URL can't be parsed."))
        .ok();
    let webhook_addr = std::env::var("WEBHOOK_ADDR")
        .map(|d| d.parse::<SocketAddr>().expect("WEBHOOK_ADDR can't be parsed."))
        .ok();

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![connection, sessions, notifier])
        .enable_ctrlc_handler()
        .build();

    if let (Some(webhook_url), Some(webhook_addr)) = (webhook_url, webhook_addr) {
        let listener = webhooks::axum(bot, Options::new(webhook_addr, webhook_url))
            .await
            .expect("Failed to build a listener.");
        dispatcher
            .dispatch_with_listener(listener, Arc::new(IgnoringErrorHandlerSafe))
            .await
    } else {
        dispatcher.dispatch().await
    }
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(commands::start::<Connection>))
        .branch(case![Command::Help].endpoint(commands::help::<Connection>))
        .branch(case![Command::Stats].endpoint(commands::stats::<Connection>))
        .branch(case![Command::Test].endpoint(runner::start_test::<Connection>))
        .branch(case![Command::AdminStats].endpoint(admin::admin_stats::<Connection>))
        .branch(case![Command::AdminBroadcast(message)].endpoint(admin::admin_broadcast::<Connection>));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .endpoint(runner::free_text);

    dptree::entry()
        .branch(message_handler)
        .branch(Update::filter_callback_query().endpoint(runner::take_answer::<Connection>))
}
