//! FieldBot: collects agronomist field reports from Telegram into an Excel summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use fieldbot_chat::{CompletionBackend, LLMConfig, YandexGpt};
use fieldbot_connectors::TelegramBot;
use fieldbot_core::{BotConfig, ReferenceData};
use fieldbot_server::{polling, AppState, ReportScheduler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("FIELDBOT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn completion_backend() -> anyhow::Result<Option<Arc<dyn CompletionBackend>>> {
    let Some(llm_config) = LLMConfig::from_env() else {
        warn!("YandexGPT is not configured, using the rule-based parser only");
        return Ok(None);
    };
    let client = YandexGpt::new(llm_config).context("Failed to build YandexGPT client")?;
    Ok(Some(Arc::new(client)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = BotConfig::from_env(&data_dir).context("Invalid configuration")?;
    let reference = ReferenceData::load(&config.data_paths.reference_file);
    let backend = completion_backend()?;

    let bot = Arc::new(TelegramBot::new(config.bot_token.clone())?);
    let me = bot
        .get_me()
        .await
        .map_err(|e| anyhow::anyhow!(config.mask_token(&e.to_string())))
        .context("Bot token check failed")?;
    info!(
        "Bot started as @{}",
        me.username.as_deref().unwrap_or("unknown")
    );

    let scheduler = ReportScheduler::new(config.report_time, config.report_send_to.clone());
    let state = Arc::new(AppState::new(config, reference, backend));
    scheduler.spawn(state.clone(), bot.clone());

    polling::run(state, bot).await;
    Ok(())
}
