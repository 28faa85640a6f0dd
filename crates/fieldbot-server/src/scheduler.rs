//! Daily report delivery.

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use fieldbot_connectors::TelegramBot;
use tracing::{error, info, warn};

use crate::handlers;
use crate::state::AppState;

/// Renders the workbook once a day and sends it to the configured chats.
pub struct ReportScheduler {
    report_time: NaiveTime,
    recipients: Vec<i64>,
}

impl ReportScheduler {
    pub fn new(report_time: NaiveTime, recipients: Vec<i64>) -> Self {
        Self {
            report_time,
            recipients,
        }
    }

    /// First run strictly after `now`.
    pub fn next_run_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.report_time);
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }

    pub fn spawn(self, state: Arc<AppState>, bot: Arc<TelegramBot>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(state, bot).await })
    }

    async fn run(self, state: Arc<AppState>, bot: Arc<TelegramBot>) {
        if self.recipients.is_empty() {
            info!("No report recipients configured, scheduled reports disabled");
            return;
        }
        info!(
            "Scheduled report at {} for {} chats",
            self.report_time.format("%H:%M"),
            self.recipients.len()
        );

        loop {
            let now = Local::now().naive_local();
            let next = self.next_run_after(now);
            let delay = (next - now).to_std().unwrap_or_default();
            info!("Next scheduled report at {}", next.format("%d.%m.%Y %H:%M"));
            tokio::time::sleep(delay).await;

            self.deliver(&state, &bot).await;
        }
    }

    async fn deliver(&self, state: &AppState, bot: &TelegramBot) {
        let path = match handlers::generate_report(state) {
            Ok(Some(path)) => path,
            Ok(None) => {
                info!("Scheduled report skipped, archive is empty");
                return;
            }
            Err(e) => {
                error!("Scheduled report failed: {}", e);
                return;
            }
        };

        let caption = format!("Ежедневный отчет агрономов на {}", Local::now().format("%d.%m.%Y"));
        for chat_id in &self.recipients {
            if let Err(e) = bot.send_document(*chat_id, &path, Some(&caption)).await {
                warn!(
                    "Failed to deliver report to chat {}: {}",
                    chat_id,
                    state.config.mask_token(&e.to_string())
                );
            }
        }
    }
}
