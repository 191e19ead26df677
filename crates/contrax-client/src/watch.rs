//! Analysis-status watcher.
//!
//! One spawned task per watched contract. While the last observation is
//! `analyzing` it fetches once per interval; otherwise it waits for the
//! cache to invalidate the contract. Terminal transitions invalidate the
//! dependent queries and raise a notification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use contrax_core::{Contract, ContractStatus, TerminalEvent, poll_delay_with, terminal_event};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{Invalidation, KeyFamily, QueryCache, QueryKey, Reason, Scope};
use crate::error::ApiError;
use crate::notify::{Notification, Notifier};

/// Where the watcher reads the contract from.
#[async_trait]
pub trait ContractSource: Send + Sync {
    async fn fetch_contract(&self, id: &str) -> Result<Contract, ApiError>;
}

/// Latest state published by a watcher.
#[derive(Debug, Clone, Default)]
pub struct WatchUpdate {
    pub contract: Option<Contract>,
    /// Set on the update that observed a terminal transition.
    pub event: Option<TerminalEvent>,
    /// Message of the last failed fetch, cleared by the next success.
    pub last_error: Option<String>,
    pub fetches: u64,
}

impl WatchUpdate {
    pub fn status(&self) -> Option<ContractStatus> {
        self.contract.as_ref().map(|c| c.status)
    }
}

/// Running watcher. Dropping the handle stops the task.
pub struct WatchHandle {
    id: String,
    task: JoinHandle<()>,
    updates: watch::Receiver<WatchUpdate>,
}

impl WatchHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn updates(&self) -> watch::Receiver<WatchUpdate> {
        self.updates.clone()
    }

    pub fn latest(&self) -> WatchUpdate {
        self.updates.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
pub struct Watcher {
    source: Arc<dyn ContractSource>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

enum Wake {
    Timer,
    Invalidated(Reason),
    Closed,
}

impl Watcher {
    pub fn new(
        source: Arc<dyn ContractSource>,
        cache: Arc<QueryCache>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            notifier,
            interval,
        }
    }

    /// Start watching `id`.
    ///
    /// `armed` marks the watch as started right after an analyze request,
    /// so a terminal status on the first observation still notifies.
    pub fn spawn(&self, id: impl Into<String>, armed: bool) -> WatchHandle {
        let id = id.into();
        let (tx, rx) = watch::channel(WatchUpdate::default());
        // Subscribe before the first fetch so no invalidation is missed.
        let events = self.cache.subscribe();
        let task = tokio::spawn(self.clone().run(id.clone(), armed, events, tx));
        WatchHandle {
            id,
            task,
            updates: rx,
        }
    }

    async fn run(
        self,
        id: String,
        mut armed: bool,
        mut events: broadcast::Receiver<Invalidation>,
        tx: watch::Sender<WatchUpdate>,
    ) {
        info!(id = %id, "watching contract");
        let mut previous: Option<ContractStatus> = None;
        let mut fetches = 0u64;

        loop {
            fetches += 1;
            match self.source.fetch_contract(&id).await {
                Ok(contract) => {
                    let next = contract.status;
                    let event = terminal_event(previous, next, armed);
                    if next != ContractStatus::Pending {
                        armed = false;
                    }
                    if let Some(event) = event {
                        self.settle(&contract, event);
                    }
                    debug!(id = %id, status = %next, fetches, "contract observed");
                    previous = Some(next);
                    tx.send_replace(WatchUpdate {
                        contract: Some(contract),
                        event,
                        last_error: None,
                        fetches,
                    });
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "status fetch failed");
                    tx.send_modify(|u| {
                        u.event = None;
                        u.last_error = Some(e.user_message());
                        u.fetches = fetches;
                    });
                }
            }

            // Unknown status (first fetch failed) keeps polling.
            let delay = match previous {
                Some(status) => poll_delay_with(status, self.interval),
                None => Some(self.interval),
            };
            match wait(&mut events, &id, delay).await {
                Wake::Timer => {}
                Wake::Invalidated(reason) => {
                    if reason == Reason::AnalysisRequested {
                        armed = true;
                    }
                }
                Wake::Closed => break,
            }
        }
        debug!(id = %id, "watcher stopped");
    }

    fn settle(&self, contract: &Contract, event: TerminalEvent) {
        match event {
            TerminalEvent::Completed => {
                self.cache
                    .invalidate(QueryKey::Clauses(contract.id.clone()), Reason::Settled);
                self.cache
                    .invalidate(KeyFamily::DashboardStats, Reason::Settled);
                info!(id = %contract.id, "analysis completed");
                self.notifier.notify(Notification::success(format!(
                    "Analysis of \"{}\" completed",
                    contract.title
                )));
            }
            TerminalEvent::Failed => {
                warn!(id = %contract.id, "analysis failed");
                self.notifier.notify(Notification::error(format!(
                    "Analysis of \"{}\" failed",
                    contract.title
                )));
            }
        }
    }
}

fn concerns(invalidation: &Invalidation, id: &str) -> bool {
    match &invalidation.scope {
        Scope::Family(family) => *family == KeyFamily::Contract,
        Scope::Key(QueryKey::Contract(key)) => key == id,
        Scope::Key(_) => false,
    }
}

/// Sleep for `delay` (forever when `None`), returning early when the
/// contract is invalidated.
async fn wait(
    events: &mut broadcast::Receiver<Invalidation>,
    id: &str,
    delay: Option<Duration>,
) -> Wake {
    let sleep = async {
        match delay {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return Wake::Timer,
            msg = events.recv() => match msg {
                Ok(inv) if concerns(&inv, id) => return Wake::Invalidated(inv.reason),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "invalidation stream lagged; refetching");
                    return Wake::Invalidated(Reason::Manual);
                }
                Err(RecvError::Closed) => return Wake::Closed,
            },
        }
    }
}

/// At most one watcher per contract id.
pub struct WatchRegistry {
    watcher: Watcher,
    active: Mutex<HashMap<String, WatchHandle>>,
}

impl WatchRegistry {
    pub fn new(watcher: Watcher) -> Self {
        Self {
            watcher,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, WatchHandle>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Watch `id`, reusing a running watcher for the same id.
    pub fn start(&self, id: &str, armed: bool) -> watch::Receiver<WatchUpdate> {
        let mut active = self.active();
        if let Some(handle) = active.get(id).filter(|h| !h.is_finished()) {
            return handle.updates();
        }
        let handle = self.watcher.spawn(id, armed);
        let rx = handle.updates();
        active.insert(id.to_string(), handle);
        rx
    }

    /// Stop watching `id`. Returns whether a watcher was running.
    pub fn stop(&self, id: &str) -> bool {
        let removed = self.active().remove(id);
        removed.is_some()
    }

    pub fn is_watching(&self, id: &str) -> bool {
        self.active().get(id).is_some_and(|h| !h.is_finished())
    }

    pub fn len(&self) -> usize {
        self.active().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active().is_empty()
    }

    pub fn stop_all(&self) {
        self.active().clear();
    }
}
