//! Auto-Lock Scheduler: one cancellable deferred lock per locker.
//!
//! Timers do not run the lock themselves. When one expires it sends an
//! [`AutoLockFired`] on a channel; the owner of the receiver takes the
//! locker's guard, [`claim`](AutoLockScheduler::claim)s the fire and
//! re-checks the current state before acting. A timer that was cancelled
//! or re-armed after it fired cannot be claimed, so a stale fire is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rackhub_core::types::LockerId;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A timer reached its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoLockFired {
    pub locker_id: LockerId,
    pub generation: u64,
}

struct ArmedEntry {
    generation: u64,
    deadline: Instant,
    cancel: CancellationToken,
}

pub struct AutoLockScheduler {
    entries: Mutex<HashMap<LockerId, ArmedEntry>>,
    next_generation: AtomicU64,
    fired_tx: mpsc::UnboundedSender<AutoLockFired>,
}

impl AutoLockScheduler {
    /// Create a scheduler and the receiver its timers report to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AutoLockFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Arm (or re-arm) the timer for `locker_id`.
    ///
    /// Any existing timer for the locker is cancelled first. Returns the
    /// generation of the new timer.
    pub async fn arm(&self, locker_id: LockerId, duration: Duration) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + duration;

        let previous = self.entries.lock().await.insert(
            locker_id.clone(),
            ArmedEntry {
                generation,
                deadline,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
            tracing::debug!(locker_id = %locker_id, "Re-armed auto-lock");
        }

        let fired_tx = self.fired_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = fired_tx.send(AutoLockFired { locker_id, generation });
                }
            }
        });

        generation
    }

    /// Cancel the timer for `locker_id`. Returns whether one was armed.
    pub async fn cancel(&self, locker_id: &LockerId) -> bool {
        match self.entries.lock().await.remove(locker_id) {
            Some(entry) => {
                entry.cancel.cancel();
                tracing::debug!(locker_id = %locker_id, "Cancelled auto-lock");
                true
            }
            None => false,
        }
    }

    /// Take ownership of a fire. Succeeds only if `generation` is still the
    /// armed timer for the locker, and removes it.
    pub async fn claim(&self, locker_id: &LockerId, generation: u64) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get(locker_id) {
            Some(entry) if entry.generation == generation => {
                entries.remove(locker_id);
                true
            }
            _ => false,
        }
    }

    /// Time left before the armed timer fires.
    pub async fn remaining(&self, locker_id: &LockerId) -> Option<Duration> {
        self.entries
            .lock()
            .await
            .get(locker_id)
            .map(|e| e.deadline.saturating_duration_since(Instant::now()))
    }

    pub async fn is_armed(&self, locker_id: &LockerId) -> bool {
        self.entries.lock().await.contains_key(locker_id)
    }

    pub async fn armed_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Cancel every timer. Used during shutdown.
    pub async fn cancel_all(&self) {
        let mut entries = self.entries.lock().await;
        for (_, entry) in entries.drain() {
            entry.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_duration() {
        let (scheduler, mut fired) = AutoLockScheduler::new();
        let id = LockerId::from("L1");
        let generation = scheduler.arm(id.clone(), Duration::from_secs(30)).await;

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(fired.try_recv().is_err());
        assert_eq!(
            scheduler.remaining(&id).await,
            Some(Duration::from_secs(1))
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        let fire = fired.recv().await.unwrap();
        assert_eq!(fire, AutoLockFired { locker_id: id.clone(), generation });
        assert!(scheduler.claim(&id, generation).await);
        assert!(!scheduler.is_armed(&id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let (scheduler, mut fired) = AutoLockScheduler::new();
        let id = LockerId::from("L1");
        scheduler.arm(id.clone(), Duration::from_secs(30)).await;
        assert!(scheduler.cancel(&id).await);
        assert!(!scheduler.cancel(&id).await);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(fired.try_recv().is_err());
        assert_eq!(scheduler.remaining(&id).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_supersedes_previous_timer() {
        let (scheduler, mut fired) = AutoLockScheduler::new();
        let id = LockerId::from("L1");
        let first = scheduler.arm(id.clone(), Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = scheduler.arm(id.clone(), Duration::from_secs(30)).await;
        assert_eq!(scheduler.armed_count().await, 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(fired.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let fire = fired.recv().await.unwrap();
        assert_eq!(fire.generation, second);
        assert!(!scheduler.claim(&id, first).await);
        assert!(scheduler.claim(&id, second).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fire_cannot_be_claimed() {
        let (scheduler, mut fired) = AutoLockScheduler::new();
        let id = LockerId::from("L1");
        let generation = scheduler.arm(id.clone(), Duration::from_secs(5)).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        let fire = fired.recv().await.unwrap();
        // Cancelled after the timer fired but before the fire was handled.
        scheduler.cancel(&id).await;
        assert!(!scheduler.claim(&fire.locker_id, generation).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_everything() {
        let (scheduler, mut fired) = AutoLockScheduler::new();
        scheduler.arm(LockerId::from("L1"), Duration::from_secs(5)).await;
        scheduler.arm(LockerId::from("L2"), Duration::from_secs(5)).await;
        scheduler.cancel_all().await;
        assert_eq!(scheduler.armed_count().await, 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(fired.try_recv().is_err());
    }
}
