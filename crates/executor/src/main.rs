use dotenvy::dotenv;
use std::sync::{Arc, atomic::AtomicI32};
use teloxide::Bot;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use common::actors::ActorType;
use common::config::Settings;
use common::logger;
use exchanges::{AdapterFactory, ExchangeEndpoints, SizingPolicy};
use registry::SubscriptionRegistry;
use signals::available_channels;

use crate::actors::supervisor::Supervisor;
use crate::services::channel_listener::{ChannelListener, ChannelRoutes, ChannelWorker};
use crate::services::dispatcher::{ChannelSignal, SignalDispatcher};
use crate::services::execution_service::{ExecutionConfig, ExecutionReport};
use crate::services::subscription_feed::SubscriptionFeed;
use crate::services::telegram_service::TelegramService;

mod actors;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::setup_logger();
    debug!("System starting up...");

    let settings = Settings::from_env()?;
    info!(
        "Polling every {:?}, sweeping every {:?}, cancel policy {:?}",
        settings.poll_interval, settings.sweep_interval, settings.cancel_policy
    );

    let registry = Arc::new(SubscriptionRegistry::new());
    let factory = AdapterFactory::new(
        ExchangeEndpoints {
            coinex: settings.coinex_base_url.clone(),
            toobit: settings.toobit_base_url.clone(),
        },
        SizingPolicy::default(),
    );

    let (signal_tx, signal_rx) = mpsc::channel::<ChannelSignal>(256);
    let (event_tx, event_rx) = mpsc::channel::<ExecutionReport>(1_024);

    let notifier = TelegramService::new(settings.telegram_token.as_deref());
    tokio::spawn(notifier.start(event_rx));

    let dispatcher = SignalDispatcher::new(
        registry.clone(),
        Arc::new(factory),
        ExecutionConfig::from(&settings),
    )
    .with_events(event_tx);
    tokio::spawn(dispatcher.run(signal_rx, settings.sweep_interval));

    let mut routes = ChannelRoutes::default();
    for profile in available_channels() {
        let (post_tx, post_rx) = mpsc::channel::<String>(64);
        routes.add(profile.clone(), post_tx);
        tokio::spawn(ChannelWorker::new(profile, post_rx, signal_tx.clone()).run());
    }
    drop(signal_tx);

    let mut supervisor = Supervisor::new();

    let registry_for_feed = registry.clone();
    let subscriptions_path = settings.subscriptions_path.clone();
    let feed_interval = settings.feed_interval;
    supervisor.register_actor(
        ActorType::SubscriptionFeed,
        Box::new(move || {
            Box::new(SubscriptionFeed::new(
                subscriptions_path.clone(),
                feed_interval,
                registry_for_feed.clone(),
            ))
        }),
    );

    match settings.telegram_token.as_deref() {
        Some(token) => {
            let bot = Bot::new(token);
            let offset = Arc::new(AtomicI32::new(0));
            supervisor.register_actor(
                ActorType::ChannelListener,
                Box::new(move || {
                    Box::new(ChannelListener::new(
                        bot.clone(),
                        routes.clone(),
                        offset.clone(),
                    ))
                }),
            );
        }
        None => warn!("TELEGRAM_BOT_TOKEN not set, channel listener disabled"),
    }

    tokio::select! {
        _ = supervisor.start() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    Ok(())
}
