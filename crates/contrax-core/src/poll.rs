//! Polling policy for a contract under analysis.
//!
//! Kept as pure functions so the cadence and the stop condition can be
//! tested without a timer or a network.

use std::time::Duration;

use crate::contract::ContractStatus;

/// Re-fetch cadence while a contract is `analyzing`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Delay before the next fetch given the last observed status.
///
/// `None` means stop: no further fetches until the cached entry is
/// invalidated.
pub fn poll_delay(status: ContractStatus) -> Option<Duration> {
    poll_delay_with(status, POLL_INTERVAL)
}

/// [`poll_delay`] with a custom interval.
pub fn poll_delay_with(status: ContractStatus, interval: Duration) -> Option<Duration> {
    match status {
        ContractStatus::Analyzing => Some(interval),
        ContractStatus::Pending | ContractStatus::Completed | ContractStatus::Error => None,
    }
}

/// Observable side effect of reaching a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalEvent {
    Completed,
    Failed,
}

/// Decide whether an observation settles an analysis.
///
/// Fires when `next` is terminal and either the previous observation was
/// not, or `armed` is set (an analyze request was issued since the last
/// observation, so a terminal status seen right after it belongs to the new
/// run). Opening an already-settled contract fires nothing.
pub fn terminal_event(
    previous: Option<ContractStatus>,
    next: ContractStatus,
    armed: bool,
) -> Option<TerminalEvent> {
    let was_running = previous.is_some_and(|p| !p.is_terminal());
    if !(was_running || armed) {
        return None;
    }
    match next {
        ContractStatus::Completed => Some(TerminalEvent::Completed),
        ContractStatus::Error => Some(TerminalEvent::Failed),
        ContractStatus::Pending | ContractStatus::Analyzing => None,
    }
}
