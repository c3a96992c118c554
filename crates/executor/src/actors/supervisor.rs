use std::{collections::HashMap, time::Duration};
use tracing::{error, info, warn};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};

use crate::actors::{Actor, ActorType, ControlMessage};

pub type ActorFactory = Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// Keeps long-lived actors alive: restarts those that crash or stop sending heartbeats.
pub struct Supervisor {
    actor_factories: HashMap<ActorType, ActorFactory>,
    pulses: HashMap<ActorType, Instant>,
    handles: HashMap<ActorType, JoinHandle<()>>,
    check_every: Duration,
    heartbeat_timeout: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            actor_factories: HashMap::new(),
            pulses: HashMap::new(),
            handles: HashMap::new(),
            check_every: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(3),
        }
    }

    #[cfg(test)]
    fn with_timing(mut self, check_every: Duration, heartbeat_timeout: Duration) -> Self {
        self.check_every = check_every;
        self.heartbeat_timeout = heartbeat_timeout;
        self
    }

    pub fn register_actor(&mut self, actor_type: ActorType, factory: ActorFactory) {
        self.actor_factories.insert(actor_type, factory);
    }

    pub async fn start(&mut self) {
        let mut check_interval = time::interval(self.check_every);

        let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<ControlMessage>(512);

        let actors: Vec<ActorType> = self.actor_factories.keys().copied().collect();
        for actor in actors {
            self.spawn_actor(actor, supervisor_tx.clone());
        }

        loop {
            tokio::select! {
                Some(msg) = supervisor_rx.recv() => {
                    match msg {
                        ControlMessage::Heartbeat(actor_type) => {
                            self.pulses.insert(actor_type, Instant::now());
                        }
                        ControlMessage::Shutdown(actor_type) => {
                            warn!("{:?} is shutting down gracefully.", actor_type);
                            self.pulses.remove(&actor_type);
                            if let Some(handle) = self.handles.remove(&actor_type) {
                                handle.abort();
                            }
                        },
                        ControlMessage::Error(actor_type, error_msg) => {
                            error!("Actor {:?} reported error: {}", actor_type, error_msg);
                            self.pulses.insert(actor_type, Instant::now());
                        },
                    }
                }

                _ = check_interval.tick() => {
                    let now = Instant::now();
                    let mut dead_actors = Vec::new();

                    for (actor_type, handle) in self.handles.iter() {
                        let silent = self
                            .pulses
                            .get(actor_type)
                            .is_none_or(|pulse| now.duration_since(*pulse) > self.heartbeat_timeout);

                        if handle.is_finished() {
                            warn!("{:?} stopped, restarting.", actor_type);
                            dead_actors.push(*actor_type);
                        } else if silent {
                            warn!("{:?} is unresponsive!", actor_type);
                            handle.abort();
                            dead_actors.push(*actor_type);
                        }
                    }

                    for actor_type in dead_actors {
                        self.spawn_actor(actor_type, supervisor_tx.clone());
                    }
                }
            }
        }
    }

    fn spawn_actor(&mut self, actor_type: ActorType, tx: mpsc::Sender<ControlMessage>) {
        let Some(factory) = self.actor_factories.get(&actor_type) else {
            return;
        };

        let mut new_actor = factory();
        let new_actor_handle = tokio::spawn(async move {
            if let Err(e) = new_actor.run(tx).await {
                error!("Actor {:?} crashed: {:#}", actor_type, e);
            }
        });
        info!("{:?} spawned", actor_type);

        self.handles.insert(actor_type, new_actor_handle);
        self.pulses.insert(actor_type, Instant::now());
    }
}
