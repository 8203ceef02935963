use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use orderly_chat::events::ChatEvent;
use orderly_core::domain::actor::{ActorId, ChannelId};
use orderly_core::domain::order::{Order, OrderId};

/// Everything the engine loop can be asked to do. Database inserts, gateway
/// events, and the engine's own timers all arrive through this one queue, so
/// the shared workflow state is only ever touched sequentially.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    OrderInserted(Order),
    Chat(ChatEvent),
    StaleSweep,
    EvictStages,
    /// Fires `archive_delay` after an order finalized. Stale generations are
    /// ignored, which is how a reopened order cancels its pending archive.
    ArchiveDue { order_id: OrderId, thread: ChannelId, generation: u64 },
    /// Fires when a cancellation-reason prompt ran out of time.
    PromptTimeout { actor: ActorId, generation: u64 },
}

/// Cloneable sender half of the engine queue.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineEvent>,
}

impl EngineHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    pub async fn send(&self, event: EngineEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }

    /// Enqueues `event` after `delay`. The sleep runs off-loop; only the
    /// delivery touches engine state.
    pub fn schedule(&self, delay: Duration, event: EngineEvent) -> JoinHandle<()> {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(event).await;
        })
    }

    /// Recurring tick used for the stale sweep and the stage TTL eviction.
    pub fn spawn_interval(&self, every: Duration, event: EngineEvent) -> JoinHandle<()> {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it so the first
            // sweep happens one full interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if sender.send(event.clone()).await.is_err() {
                    return;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{EngineEvent, EngineHandle};

    #[tokio::test(start_paused = true)]
    async fn schedule_delivers_after_the_delay() {
        let (handle, mut receiver) = EngineHandle::channel(4);
        handle.schedule(Duration::from_secs(300), EngineEvent::StaleSweep);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(receiver.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(receiver.recv().await, Some(EngineEvent::StaleSweep));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_skips_the_immediate_first_tick() {
        let (handle, mut receiver) = EngineHandle::channel(4);
        handle.spawn_interval(Duration::from_secs(60), EngineEvent::EvictStages);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(receiver.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(receiver.recv().await, Some(EngineEvent::EvictStages));
    }
}
