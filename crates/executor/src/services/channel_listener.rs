use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::actors::{Actor, ActorType, ControlMessage};
use signals::{ChannelProfile, SignalParser};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, UpdateKind};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::services::dispatcher::ChannelSignal;

/// Hands channel posts to the worker of the channel they came from.
#[derive(Clone, Default)]
pub struct ChannelRoutes {
    routes: Vec<(ChannelProfile, mpsc::Sender<String>)>,
}

impl ChannelRoutes {
    pub fn add(&mut self, profile: ChannelProfile, post_tx: mpsc::Sender<String>) {
        self.routes.push((profile, post_tx));
    }

    /// Returns false when no known channel matches `chat_id`.
    pub async fn forward(&self, chat_id: i64, text: &str) -> bool {
        let Some((profile, post_tx)) = self
            .routes
            .iter()
            .find(|(profile, _)| profile.matches_chat(chat_id))
        else {
            return false;
        };

        if post_tx.send(text.to_string()).await.is_err() {
            error!("Worker for {} is gone, dropping post", profile.name);
        }
        true
    }
}

/// Long-polls the bot API for channel posts.
pub struct ChannelListener {
    bot: Bot,
    routes: ChannelRoutes,
    /// Shared across restarts so confirmed posts are never replayed.
    offset: Arc<AtomicI32>,
}

impl ChannelListener {
    pub fn new(bot: Bot, routes: ChannelRoutes, offset: Arc<AtomicI32>) -> Self {
        Self {
            bot,
            routes,
            offset,
        }
    }

    async fn poll_once(&self) -> Result<usize, teloxide::RequestError> {
        let mut request = self
            .bot
            .get_updates()
            .timeout(10)
            .allowed_updates(vec![AllowedUpdate::ChannelPost]);

        let current_offset = self.offset.load(Ordering::SeqCst);
        if current_offset > 0 {
            request = request.offset(current_offset);
        }

        let updates = request.await?;
        let mut forwarded = 0;

        for update in updates {
            self.offset.store(update.id.0 as i32 + 1, Ordering::SeqCst);

            let UpdateKind::ChannelPost(post) = update.kind else {
                continue;
            };
            let Some(text) = post.text().or_else(|| post.caption()) else {
                continue;
            };

            if self.routes.forward(post.chat.id.0, text).await {
                forwarded += 1;
            } else {
                debug!("Ignoring post from unknown chat {}", post.chat.id);
            }
        }

        Ok(forwarded)
    }
}

#[async_trait]
impl Actor for ChannelListener {
    fn name(&self) -> ActorType {
        ActorType::ChannelListener
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let _heartbeat = self.spawn_heartbeat(supervisor_tx.clone());

        info!("Starting Channel Listener");

        loop {
            match self.poll_once().await {
                Ok(0) => {}
                Ok(n) => debug!("Forwarded {} channel post(s)", n),
                Err(e) => {
                    warn!("Telegram poll failed: {}. Retrying in 2s...", e);
                    if supervisor_tx
                        .send(ControlMessage::Error(
                            self.name(),
                            format!("Telegram poll failed: {}", e),
                        ))
                        .await
                        .is_err()
                    {
                        anyhow::bail!("Supervisor channel closed");
                    }
                    time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }
}

/// Parses posts of one channel and forwards the valid signals.
pub struct ChannelWorker {
    profile: ChannelProfile,
    post_rx: mpsc::Receiver<String>,
    signal_tx: mpsc::Sender<ChannelSignal>,
}

impl ChannelWorker {
    pub fn new(
        profile: ChannelProfile,
        post_rx: mpsc::Receiver<String>,
        signal_tx: mpsc::Sender<ChannelSignal>,
    ) -> Self {
        Self {
            profile,
            post_rx,
            signal_tx,
        }
    }

    pub async fn run(mut self) {
        info!("Watching channel {} ({})", self.profile.name, self.profile.url);

        while let Some(post) = self.post_rx.recv().await {
            match self.profile.parse_signal(&post) {
                Ok(signal) => {
                    info!(
                        "Signal from {}: {} {} x{}",
                        self.profile.name, signal.position, signal.market, signal.leverage
                    );
                    let forwarded = ChannelSignal {
                        channel: self.profile.name.to_string(),
                        signal,
                    };
                    if self.signal_tx.send(forwarded).await.is_err() {
                        warn!("Dispatcher is gone. Stopping {} worker.", self.profile.name);
                        break;
                    }
                }
                Err(e) => debug!("Ignoring post from {}: {}", self.profile.name, e),
            }
        }
    }
}
