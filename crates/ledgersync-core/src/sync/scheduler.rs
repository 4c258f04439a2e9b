//! Background reconciliation.
//!
//! The scheduler pulls on a fixed interval and whenever the host reports
//! that the user came back (focus regained). Ticks that land while another
//! sync is running are skipped rather than queued, and focus events that
//! arrive during a pull collapse into that pull.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::SyncManager;

/// Default period between automatic pulls.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Buffer size for the command channel
const COMMAND_BUFFER_SIZE: usize = 8;

#[derive(Debug)]
enum Command {
    FocusRegained,
    Stop,
}

/// Spawns the reconciliation task for a manager.
pub struct Scheduler;

impl Scheduler {
    /// Start pulling every `interval`. The first pull happens one interval
    /// after start; callers wanting an immediate pull do it themselves.
    pub fn start(manager: Arc<SyncManager>, interval: Duration) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let task_manager = Arc::clone(&manager);
        let task = tokio::spawn(async move {
            Self::run(task_manager, interval, rx).await;
        });
        info!(interval = ?interval, "Automatic sync started");

        SchedulerHandle {
            manager,
            commands: tx,
            task,
        }
    }

    async fn run(manager: Arc<SyncManager>, period: Duration, mut commands: mpsc::Receiver<Command>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::reconcile(&manager, "interval").await;
                }
                command = commands.recv() => match command {
                    Some(Command::FocusRegained) => {
                        Self::reconcile(&manager, "focus").await;
                        if Self::drain_focus_events(&mut commands) {
                            break;
                        }
                    }
                    Some(Command::Stop) | None => break,
                }
            }
        }
        debug!("Automatic sync loop exited");
    }

    /// Discard focus events queued while a pull ran; that pull already
    /// covered them. Returns true if a stop request was found.
    fn drain_focus_events(commands: &mut mpsc::Receiver<Command>) -> bool {
        let mut coalesced = 0;
        loop {
            match commands.try_recv() {
                Ok(Command::FocusRegained) => coalesced += 1,
                Ok(Command::Stop) | Err(mpsc::error::TryRecvError::Disconnected) => return true,
                Err(mpsc::error::TryRecvError::Empty) => break,
            }
        }
        if coalesced > 0 {
            debug!(coalesced = coalesced, "Coalesced focus events into the last pull");
        }
        false
    }

    async fn reconcile(manager: &SyncManager, trigger: &str) {
        match manager.reconcile_if_idle().await {
            Some(cache) => debug!(
                trigger = trigger,
                incomes = cache.incomes.len(),
                expenses = cache.expenses.len(),
                "Background pull finished"
            ),
            None => debug!(trigger = trigger, "Sync in progress, skipping background pull"),
        }
    }
}

/// Control handle for a running scheduler.
pub struct SchedulerHandle {
    manager: Arc<SyncManager>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask for an immediate pull, e.g. when the window regains focus.
    /// Never waits: when the queue is full a pull is already pending and
    /// the event is dropped.
    pub fn focus_regained(&self) {
        match self.commands.try_send(Command::FocusRegained) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Pull already pending, focus event dropped"),
            Err(TrySendError::Closed(_)) => warn!("Scheduler is not running, focus event dropped"),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop, wait for it to exit and flush the local cache.
    /// Nothing is pushed to the remote on the way out.
    pub async fn stop(self) {
        // A closed channel means the loop already exited
        let _ = self.commands.send(Command::Stop).await;
        if let Err(e) = self.task.await {
            error!(error = %e, "Automatic sync task failed");
        }
        if let Err(e) = self.manager.flush_local() {
            warn!(error = %e, "Failed to flush local cache on shutdown");
        }
        info!("Automatic sync stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCacheStore, StoreKey};
    use crate::models::DatasetKind;
    use crate::remote::MemoryBlobStore;
    use crate::sync::{SyncOptions, SyncStatus};

    const PATH: &str = "data/gastos.json";

    fn setup() -> (Arc<SyncManager>, Arc<MemoryBlobStore>, Arc<MemoryCacheStore>) {
        let remote = Arc::new(MemoryBlobStore::new());
        let store = Arc::new(MemoryCacheStore::new());
        let manager = Arc::new(SyncManager::new(
            SyncOptions::new(PATH, "main"),
            remote.clone(),
            store.clone(),
        ));
        (manager, remote, store)
    }

    #[tokio::test]
    async fn test_interval_pulls_remote() {
        let (manager, remote, _) = setup();
        remote.put(PATH, r#"{"receitas":[{"id":1,"descricao":"Salario","valor":10,"categoria":"x"}]}"#);

        let handle = Scheduler::start(manager.clone(), Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop().await;

        assert!(remote.fetch_count() >= 1);
        assert_eq!(manager.snapshot().incomes.len(), 1);
        assert_eq!(manager.status(), SyncStatus::Connected);
    }

    #[tokio::test]
    async fn test_focus_triggers_pull() {
        let (manager, remote, _) = setup();
        remote.put(PATH, r#"{"despesas":[]}"#);

        let handle = Scheduler::start(manager.clone(), Duration::from_secs(3600));
        handle.focus_regained();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(remote.fetch_count(), 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_focus_bursts_collapse_into_one_pull() {
        let (manager, remote, _) = setup();
        remote.put(PATH, r#"{"despesas":[]}"#);
        remote.set_latency(Duration::from_millis(50));

        let handle = Scheduler::start(manager.clone(), Duration::from_secs(3600));
        for _ in 0..(COMMAND_BUFFER_SIZE * 3) {
            handle.focus_regained();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(remote.fetch_count(), 1);

        // A later focus event still pulls
        handle.focus_regained();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(remote.fetch_count(), 2);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_tick_skipped_while_busy() {
        let (manager, remote, _) = setup();
        remote.set_latency(Duration::from_millis(200));

        let slow = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reconcile_from_remote().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let handle = Scheduler::start(manager.clone(), Duration::from_secs(3600));
        handle.focus_regained();
        tokio::time::sleep(Duration::from_millis(50)).await;
        slow.await.unwrap();
        handle.stop().await;

        // Only the explicit pull reached the remote
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_flushes_without_pushing() {
        let (manager, remote, store) = setup();
        let handle = Scheduler::start(manager.clone(), Duration::from_secs(3600));
        assert!(handle.is_running());

        handle.stop().await;

        assert!(store.load(StoreKey::Dataset(DatasetKind::Incomes)).unwrap().is_some());
        assert!(remote.attempts().is_empty());
    }
}
