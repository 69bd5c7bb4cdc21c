//! Dispatcher actor and the handle request handlers use to reach it.

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use status_core::{JobId, StatusUpdate};

use crate::config::BroadcastConfig;
use crate::dispatcher::{BroadcastStats, Dispatcher};
use crate::error::BroadcastError;
use crate::messages::BroadcastMessage;
use crate::registry::{SubscriberRegistry, Subscription};

/// Actor that owns the dispatcher.
///
/// Its mailbox serializes every publish and completion, so producers never
/// wait on subscribers and each subscription sees updates in call order.
pub struct BroadcastActor;

impl Actor for BroadcastActor {
    type Msg = BroadcastMessage;
    type State = Dispatcher;
    type Arguments = Arc<SubscriberRegistry>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        registry: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting status dispatcher");
        Ok(Dispatcher::new(registry))
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BroadcastMessage::Publish { update } => {
                // One unserializable update must not take the dispatcher down.
                if let Err(e) = state.publish(&update) {
                    tracing::error!("Failed to publish {}: {}", update.description(), e);
                }
            }

            BroadcastMessage::Complete { job_id } => {
                state.complete(job_id.as_ref());
            }

            BroadcastMessage::Stats { reply } => {
                let _ = reply.send(state.stats());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Status dispatcher stopped with {} live subscription(s)",
            state.registry().len()
        );
        Ok(())
    }
}

/// Cloneable handle shared by every request handler.
///
/// Subscribing touches the registry directly; publishing and completing go
/// through the actor mailbox and return as soon as the message is queued.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    actor: ActorRef<BroadcastMessage>,
    rpc_timeout: Duration,
}

impl Broadcaster {
    /// Create the registry and spawn the dispatcher actor.
    pub async fn start(
        config: BroadcastConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), BroadcastError> {
        let registry = Arc::new(SubscriberRegistry::new(config.queue_capacity));
        let (actor, handle) = Actor::spawn(None, BroadcastActor, registry.clone()).await?;

        let broadcaster = Self {
            registry,
            actor,
            rpc_timeout: config.rpc_timeout,
        };
        Ok((broadcaster, handle))
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Queue an update for delivery. Never waits on subscribers.
    pub fn publish(&self, update: StatusUpdate) -> Result<(), BroadcastError> {
        self.actor
            .send_message(BroadcastMessage::Publish {
                update: Box::new(update),
            })
            .map_err(|_| BroadcastError::Stopped)
    }

    /// Queue the end of stream for one job, after any update queued before it.
    pub fn complete(&self, job_id: Option<JobId>) -> Result<(), BroadcastError> {
        self.actor
            .send_message(BroadcastMessage::Complete { job_id })
            .map_err(|_| BroadcastError::Stopped)
    }

    pub fn subscribe(&self, job_id: Option<JobId>) -> Subscription {
        self.registry.subscribe(job_id)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.registry.unsubscribe(subscription)
    }

    /// Ask the dispatcher for its totals.
    pub async fn stats(&self) -> Result<BroadcastStats, BroadcastError> {
        let result = ractor::rpc::call(
            &self.actor,
            |reply| BroadcastMessage::Stats { reply },
            Some(self.rpc_timeout),
        )
        .await;

        match result {
            Ok(ractor::rpc::CallResult::Success(stats)) => Ok(stats),
            Ok(ractor::rpc::CallResult::Timeout) => Err(BroadcastError::Timeout),
            Ok(ractor::rpc::CallResult::SenderError) | Err(_) => Err(BroadcastError::Stopped),
        }
    }

    /// Stop the dispatcher. Pending messages are discarded.
    pub fn stop(&self) {
        self.actor.stop(None);
    }
}
