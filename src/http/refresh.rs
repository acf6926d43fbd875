//! Single-flight access-token refresh
//!
//! [`RefreshCoordinator`] guarantees that at most one refresh call is in
//! flight at any time. The first caller that needs a refresh becomes the
//! [`RefreshLeader`] and performs the network call; every caller that
//! arrives while the refresh is running is queued as a [`RefreshWaiter`] and
//! receives the leader's outcome, in arrival order, once the leader resolves.
//!
//! The `Idle -> Refreshing` transition happens under a lock inside
//! [`RefreshCoordinator::acquire`], before the caller can reach any await
//! point, so two tasks can never both observe "no refresh in flight".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

/// Why a refresh did not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RefreshFailure(pub String);

/// New access token, or the shared failure.
pub type RefreshOutcome = std::result::Result<String, RefreshFailure>;

#[derive(Debug)]
enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

/// Coordinates token refreshes across concurrent requests.
#[derive(Debug)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    started: AtomicU64,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Role handed out by [`RefreshCoordinator::acquire`].
#[derive(Debug)]
pub enum RefreshTicket<'a> {
    /// This caller must perform the refresh and then call
    /// [`RefreshLeader::resolve`].
    Leader(RefreshLeader<'a>),
    /// A refresh is already running; await its outcome.
    Waiter(RefreshWaiter),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            started: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the refresh or joins the queue behind the running one.
    ///
    /// # Examples
    ///
    /// ```
    /// use botdesk::http::refresh::{RefreshCoordinator, RefreshTicket};
    ///
    /// let coordinator = RefreshCoordinator::new();
    /// let first = coordinator.acquire();
    /// let second = coordinator.acquire();
    /// assert!(matches!(first, RefreshTicket::Leader(_)));
    /// assert!(matches!(second, RefreshTicket::Waiter(_)));
    /// ```
    pub fn acquire(&self) -> RefreshTicket<'_> {
        let mut state = self.lock();
        if let RefreshState::Refreshing { waiters } = &mut *state {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            tracing::debug!(queued = waiters.len(), "Queued behind in-flight token refresh");
            return RefreshTicket::Waiter(RefreshWaiter { rx });
        }

        *state = RefreshState::Refreshing {
            waiters: Vec::new(),
        };
        self.started.fetch_add(1, Ordering::SeqCst);
        RefreshTicket::Leader(RefreshLeader {
            coordinator: self,
            resolved: false,
        })
    }

    /// Returns `true` while a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of refreshes started since construction.
    pub fn refreshes_started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns to `Idle` and hands `outcome` to every queued waiter.
    fn finish(&self, outcome: RefreshOutcome) -> usize {
        let waiters = match std::mem::replace(&mut *self.lock(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose request was dropped no longer cares.
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}

/// The caller responsible for the in-flight refresh.
///
/// Dropping a leader without resolving it (for example because its task was
/// cancelled) fails every queued waiter.
#[derive(Debug)]
pub struct RefreshLeader<'a> {
    coordinator: &'a RefreshCoordinator,
    resolved: bool,
}

impl RefreshLeader<'_> {
    /// Publishes the refresh outcome and drains the queue.
    pub fn resolve(mut self, outcome: RefreshOutcome) {
        self.resolved = true;
        let succeeded = outcome.is_ok();
        let drained = self.coordinator.finish(outcome);
        tracing::debug!(succeeded, drained, "Token refresh resolved");
    }
}

impl Drop for RefreshLeader<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!("Token refresh abandoned before completion");
            self.coordinator.finish(Err(RefreshFailure(
                "token refresh was cancelled".to_string(),
            )));
        }
    }
}

/// A caller queued behind the in-flight refresh.
#[derive(Debug)]
pub struct RefreshWaiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshWaiter {
    /// Waits for the leader's outcome.
    pub async fn wait(self) -> RefreshOutcome {
        self.rx.await.unwrap_or_else(|_| {
            Err(RefreshFailure(
                "token refresh ended without a result".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leader(ticket: RefreshTicket<'_>) -> RefreshLeader<'_> {
        match ticket {
            RefreshTicket::Leader(l) => l,
            RefreshTicket::Waiter(_) => panic!("expected leader"),
        }
    }

    fn waiter(ticket: RefreshTicket<'_>) -> RefreshWaiter {
        match ticket {
            RefreshTicket::Waiter(w) => w,
            RefreshTicket::Leader(_) => panic!("expected waiter"),
        }
    }

    #[tokio::test]
    async fn test_waiters_receive_leader_token_in_order() {
        let coordinator = RefreshCoordinator::new();
        let lead = leader(coordinator.acquire());
        let w1 = waiter(coordinator.acquire());
        let w2 = waiter(coordinator.acquire());
        assert!(coordinator.is_refreshing());

        lead.resolve(Ok("new-token".to_string()));

        assert!(!coordinator.is_refreshing());
        assert_eq!(w1.wait().await, Ok("new-token".to_string()));
        assert_eq!(w2.wait().await, Ok("new-token".to_string()));
        assert_eq!(coordinator.refreshes_started(), 1);
    }

    #[tokio::test]
    async fn test_waiters_share_failure() {
        let coordinator = RefreshCoordinator::new();
        let lead = leader(coordinator.acquire());
        let w = waiter(coordinator.acquire());

        lead.resolve(Err(RefreshFailure("refresh rejected".to_string())));

        assert_eq!(
            w.wait().await,
            Err(RefreshFailure("refresh rejected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_dropped_leader_fails_waiters_and_resets() {
        let coordinator = RefreshCoordinator::new();
        let lead = leader(coordinator.acquire());
        let w = waiter(coordinator.acquire());

        drop(lead);

        assert!(w.wait().await.is_err());
        assert!(!coordinator.is_refreshing());
        // The next caller starts a fresh refresh.
        let _next = leader(coordinator.acquire());
        assert_eq!(coordinator.refreshes_started(), 2);
    }
}
