//! One-shot readiness gate with ordered deferred calls.
//!
//! Operations issued before provisioning completes take a ticket and wait.
//! When the gate resolves, tickets are released one at a time in the order
//! they were taken: each caller receives a `Turn`, and the next ticket is
//! released only once that turn ends. A failed resolution is delivered to
//! every waiting ticket and to every later caller, so no call stalls silently.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;

use tokio::sync::{oneshot, watch, Mutex};

use crate::error::RemoteJobError;

/// Observable provisioning state of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Provisioning has not finished; calls are being deferred.
    Provisioning,
    /// Resources exist; calls run immediately.
    Ready,
    /// Provisioning failed; every call fails with this error.
    Failed(RemoteJobError),
}

type Outcome<T> = Result<Arc<T>, RemoteJobError>;

/// A released call's place in line.
///
/// While a deferred call holds its turn, the calls queued behind it stay
/// parked. Dropping the turn, or starting a backend call with `run`, lets the
/// next one proceed. Calls that never waited get a turn that holds nothing.
#[derive(Debug, Default)]
pub struct Turn {
    started: Option<oneshot::Sender<()>>,
}

impl Turn {
    /// Polls `future` once while holding the turn, then gives the turn up
    /// and drives `future` to completion.
    ///
    /// The backend request is therefore issued before any later deferred call
    /// can issue its own, without serializing the round trips.
    pub async fn run<F: Future>(self, future: F) -> F::Output {
        let mut future = pin!(future);
        let mut turn = Some(self);
        std::future::poll_fn(move |cx| {
            let poll = future.as_mut().poll(cx);
            turn.take();
            poll
        })
        .await
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if let Some(started) = self.started.take() {
            let _ = started.send(());
        }
    }
}

/// Readiness gate guarding a value produced once by a coordinator.
#[derive(Debug)]
pub struct ReadinessGate<T> {
    state: watch::Sender<ClientState>,
    inner: Mutex<GateInner<T>>,
}

#[derive(Debug)]
struct GateInner<T> {
    resolved: Option<Outcome<T>>,
    waiting: VecDeque<oneshot::Sender<(Outcome<T>, Turn)>>,
}

impl<T> Default for ReadinessGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReadinessGate<T> {
    /// Creates an unresolved gate.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(ClientState::Provisioning);
        Self {
            state,
            inner: Mutex::new(GateInner {
                resolved: None,
                waiting: VecDeque::new(),
            }),
        }
    }

    /// Returns the guarded value and the caller's turn, waiting in line if
    /// the gate is unresolved.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error if the gate resolved with a failure, or
    /// a provisioning error if the gate was dropped before resolving.
    pub async fn acquire(&self) -> Result<(Arc<T>, Turn), RemoteJobError> {
        let ticket = {
            let mut inner = self.inner.lock().await;
            if let Some(ref outcome) = inner.resolved {
                return outcome.clone().map(|value| (value, Turn::default()));
            }
            let (tx, rx) = oneshot::channel();
            inner.waiting.push_back(tx);
            tracing::debug!(position = inner.waiting.len(), "Deferring call until ready");
            rx
        };

        match ticket.await {
            Ok((outcome, turn)) => outcome.map(|value| (value, turn)),
            Err(_) => Err(RemoteJobError::Provisioning {
                resource: "client".to_string(),
                message: "client dropped before provisioning completed".to_string(),
            }),
        }
    }

    /// Resolves the gate and releases waiting tickets in FIFO order.
    ///
    /// On success each ticket is released only after the previous caller's
    /// turn ended. Calls arriving meanwhile queue behind the lock and run
    /// after every deferred call. Only the first resolution takes effect;
    /// later ones are ignored.
    pub async fn resolve(&self, outcome: Result<T, RemoteJobError>) {
        let mut inner = self.inner.lock().await;
        if inner.resolved.is_some() {
            tracing::warn!("Readiness gate already resolved, ignoring");
            return;
        }

        let outcome = outcome.map(Arc::new);
        let state = match outcome {
            Ok(_) => ClientState::Ready,
            Err(ref e) => ClientState::Failed(e.clone()),
        };

        let released = inner.waiting.len();
        while let Some(ticket) = inner.waiting.pop_front() {
            let (started_tx, started_rx) = oneshot::channel();
            let turn = Turn {
                started: Some(started_tx),
            };
            // A closed ticket belongs to a caller that gave up waiting.
            if ticket.send((outcome.clone(), turn)).is_ok() && outcome.is_ok() {
                // Err means the turn was dropped with its caller.
                let _ = started_rx.await;
            }
        }
        inner.resolved = Some(outcome);
        drop(inner);

        tracing::debug!(released, "Released deferred calls");
        self.state.send_replace(state);
    }

    /// Number of calls currently waiting on the gate.
    pub async fn pending_calls(&self) -> usize {
        self.inner.lock().await.waiting.len()
    }

    /// Returns `true` once the gate resolved successfully.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), ClientState::Ready)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Waits until the gate resolves, without taking a ticket.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error if the gate resolved with a failure.
    pub async fn wait(&self) -> Result<(), RemoteJobError> {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, ClientState::Provisioning))
            .await
            .map(|state| state.clone())
            .map_err(|_| RemoteJobError::Provisioning {
                resource: "client".to_string(),
                message: "client dropped before provisioning completed".to_string(),
            })?;

        match state {
            ClientState::Failed(err) => Err(err),
            ClientState::Ready | ClientState::Provisioning => Ok(()),
        }
    }
}
