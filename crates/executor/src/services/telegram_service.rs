use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::services::execution_service::{
    ExecutionEvent, ExecutionOutcome, ExecutionReport,
};

/// Sends execution status text to the subscriber's chat, or to the log when
/// no bot token is configured.
pub struct TelegramService {
    bot: Option<Bot>,
}

impl TelegramService {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            bot: token.map(Bot::new),
        }
    }

    pub async fn start(self, mut rx: mpsc::Receiver<ExecutionReport>) {
        match self.bot {
            Some(_) => info!("Starting Telegram Notification Service"),
            None => info!("Starting Notification Service (log only, no bot token)"),
        }

        while let Some(report) = rx.recv().await {
            let text = render(&report);

            let Some(bot) = &self.bot else {
                info!("[subscription {}] {}", report.subscription_id, text);
                continue;
            };

            // Send message and log error if it fails, but don't crash
            if let Err(e) = bot.send_message(ChatId(report.subscription_id), text).await {
                error!(
                    "Failed to send Telegram message to {}: {}",
                    report.subscription_id, e
                );
            }
        }

        info!("Execution event channel closed. Stopping notifier.");
    }
}

pub fn render(report: &ExecutionReport) -> String {
    let header = format!("{} {}", report.exchange, report.market);

    match &report.event {
        ExecutionEvent::EntryPlaced {
            side,
            entry,
            quantity,
            order,
        } => format!(
            "{}: {} trigger order {} placed, qty {} at {}",
            header, side, order, quantity, entry
        ),
        ExecutionEvent::PositionOpened => format!("{}: position opened", header),
        ExecutionEvent::ProtectionAttached {
            take_profit,
            stop_loss,
        } => format!("{}: TP {} / SL {} attached", header, take_profit, stop_loss),
        ExecutionEvent::PositionClosed => format!("{}: position closed", header),
        ExecutionEvent::Finished(ExecutionOutcome::Done) => {
            format!("{}: execution finished", header)
        }
        ExecutionEvent::Finished(ExecutionOutcome::Failed(e)) => {
            format!("{}: execution stopped, {}", header, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use common::models::Side;
    use exchanges::{ExchangeKind, OrderHandle};
    use uuid::Uuid;

    use super::*;
    use crate::services::execution_service::ExecutionError;

    fn report(event: ExecutionEvent) -> ExecutionReport {
        ExecutionReport {
            execution_id: Uuid::new_v4(),
            subscription_id: 99,
            exchange: ExchangeKind::Coinex,
            market: "BTCUSDT".to_string(),
            event,
        }
    }

    #[test]
    fn test_render_entry_and_failure() {
        let entry = render(&report(ExecutionEvent::EntryPlaced {
            side: Side::Short,
            entry: "50000".to_string(),
            quantity: 0.002,
            order: OrderHandle("987654".to_string()),
        }));
        assert!(entry.contains("BTCUSDT"));
        assert!(entry.contains("Short trigger order 987654"));
        assert!(entry.contains("qty 0.002 at 50000"));

        let failed = render(&report(ExecutionEvent::Finished(ExecutionOutcome::Failed(
            ExecutionError::InsufficientBalance {
                available: 1.5,
                minimum: 2.0,
            },
        ))));
        assert!(failed.contains("insufficient balance"));
    }

    #[tokio::test]
    async fn test_log_only_notifier_drains_channel() {
        let (tx, rx) = mpsc::channel(4);
        let notifier = tokio::spawn(TelegramService::new(None).start(rx));

        tx.send(report(ExecutionEvent::PositionOpened)).await.unwrap();
        drop(tx);

        notifier.await.unwrap();
    }
}
