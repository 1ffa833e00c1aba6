//! Process-level events from outside the XR runtime (window manager, signal
//! handlers, activity callbacks). Senders may live on any thread; the queue
//! is drained on the application thread at the top of every iteration.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info};

use crate::lifecycle::SessionLifecycle;

/// Idle wait while the host is in the foreground.
pub const IDLE_WAIT_RESUMED: Duration = Duration::from_millis(10);
/// Idle wait while the host is paused; nothing will be shown anyway.
pub const IDLE_WAIT_PAUSED: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// The host wants the process gone.
    DestroyRequested,
    Resumed,
    Paused,
}

#[derive(Debug, Clone)]
pub struct SystemEventSender {
    tx: mpsc::UnboundedSender<SystemEvent>,
}

impl SystemEventSender {
    /// Returns false once the queue has been dropped.
    pub fn send(&self, event: SystemEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Debug)]
pub struct SystemEventQueue {
    tx: mpsc::UnboundedSender<SystemEvent>,
    rx: mpsc::UnboundedReceiver<SystemEvent>,
    resumed: bool,
}

impl Default for SystemEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemEventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            resumed: true,
        }
    }

    pub fn sender(&self) -> SystemEventSender {
        SystemEventSender {
            tx: self.tx.clone(),
        }
    }

    /// How long the loop may sleep while no session is running.
    pub fn idle_wait(&self) -> Duration {
        if self.resumed {
            IDLE_WAIT_RESUMED
        } else {
            IDLE_WAIT_PAUSED
        }
    }

    /// Apply everything queued so far. Never blocks.
    ///
    /// Returns true when a destroy request found a running session, which the
    /// runtime must now be asked to exit.
    pub fn drain(&mut self, lifecycle: &mut SessionLifecycle) -> bool {
        let mut exit_session = false;
        loop {
            match self.rx.try_recv() {
                Ok(SystemEvent::DestroyRequested) => {
                    info!("destroy requested by host");
                    exit_session |= lifecycle.request_exit();
                }
                Ok(SystemEvent::Resumed) => {
                    debug!("host resumed");
                    self.resumed = true;
                }
                Ok(SystemEvent::Paused) => {
                    debug!("host paused");
                    self.resumed = false;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        exit_session
    }
}
