use std::time::Duration;

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle, time};
use tracing::debug;

pub const HEARTBEAT_EVERY: Duration = Duration::from_millis(500);

/// Long-lived services the supervisor knows how to rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    ChannelListener,
    SubscriptionFeed,
}

#[derive(Debug)]
pub enum ControlMessage {
    Heartbeat(ActorType),
    /// The actor is done for good and must not be restarted.
    Shutdown(ActorType),
    /// Recoverable trouble; also counts as a sign of life.
    Error(ActorType, String),
}

/// Heartbeat task of one actor instance. Dropping it stops the heartbeat,
/// so an aborted actor cannot keep vouching for its replacement.
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[async_trait]
pub trait Actor: Send + Sync {
    fn name(&self) -> ActorType;

    /// Runs until failure. Implementations hold the [`Heartbeat`] returned by
    /// [`Actor::spawn_heartbeat`] for as long as they run.
    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()>;

    fn spawn_heartbeat(&self, supervisor_tx: mpsc::Sender<ControlMessage>) -> Heartbeat {
        let name = self.name();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(HEARTBEAT_EVERY);
            loop {
                ticker.tick().await;
                if supervisor_tx
                    .send(ControlMessage::Heartbeat(name))
                    .await
                    .is_err()
                {
                    debug!("{:?} heartbeat stopped, supervisor is gone", name);
                    break;
                }
            }
        });
        Heartbeat { handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    #[async_trait]
    impl Actor for Idle {
        fn name(&self) -> ActorType {
            ActorType::SubscriptionFeed
        }

        async fn run(&mut self, _: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_heartbeat_carries_actor_type() {
        let (tx, mut rx) = mpsc::channel(4);
        let heartbeat = Idle.spawn_heartbeat(tx);

        match rx.recv().await {
            Some(ControlMessage::Heartbeat(actor)) => assert_eq!(actor, ActorType::SubscriptionFeed),
            other => panic!("unexpected message: {:?}", other),
        }

        drop(heartbeat);
        let drained = time::timeout(Duration::from_secs(1), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    struct Hanging;

    #[async_trait]
    impl Actor for Hanging {
        fn name(&self) -> ActorType {
            ActorType::ChannelListener
        }

        async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            let _heartbeat = self.spawn_heartbeat(supervisor_tx);
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_aborted_actor_stops_heartbeat() {
        let (tx, mut rx) = mpsc::channel(4);
        let actor = tokio::spawn(async move { Hanging.run(tx).await });

        assert!(matches!(
            rx.recv().await,
            Some(ControlMessage::Heartbeat(ActorType::ChannelListener))
        ));

        actor.abort();
        let drained = time::timeout(Duration::from_secs(1), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }
}
