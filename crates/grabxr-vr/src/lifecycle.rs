//! Session state machine.
//!
//! Only runtime events move the state. `running` says a session has been
//! begun and not yet ended; `application_running` stays true until the
//! runtime (or the platform) asks the process to go away. A running session
//! is never ended on the application's initiative: an exit request is handed
//! to the runtime, which walks the session through STOPPING to EXITING.

use tracing::{info, warn};

use crate::runtime::SessionControl;
use crate::types::SessionState;
use crate::XrResult;

#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    state: SessionState,
    running: bool,
    application_running: bool,
    exit_requested: bool,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Unknown,
            running: false,
            application_running: true,
            exit_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn application_running(&self) -> bool {
        self.application_running
    }

    /// An exit was requested while the session was running and the runtime
    /// has not reached EXITING yet.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested && self.application_running
    }

    /// Session state lets the compositor consume frames.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Gate for submitting rendered content.
    pub fn can_render(&self) -> bool {
        self.running && self.is_active()
    }

    /// Apply a session-state-changed event.
    ///
    /// READY begins the session and STOPPING ends it; a failure of either
    /// call is returned and leaves `running` untouched.
    pub fn on_state_changed<S: SessionControl + ?Sized>(
        &mut self,
        new_state: SessionState,
        session: &mut S,
    ) -> XrResult<()> {
        info!(
            from = self.state.as_str(),
            to = new_state.as_str(),
            "session state changed"
        );
        match new_state {
            SessionState::Ready => {
                session.begin_session()?;
                self.running = true;
            }
            SessionState::Stopping => {
                session.end_session()?;
                self.running = false;
            }
            SessionState::Exiting | SessionState::LossPending => {
                self.terminate();
            }
            _ => {}
        }
        self.state = new_state;
        Ok(())
    }

    /// The runtime instance is about to be lost.
    pub fn on_instance_loss_pending(&mut self) {
        warn!("instance loss pending, shutting down");
        self.terminate();
    }

    /// Platform asked the process to exit.
    ///
    /// Without a running session the application stops at once. Otherwise the
    /// call returns true the first time, and the caller must ask the runtime
    /// to exit the session.
    pub fn request_exit(&mut self) -> bool {
        if !self.running {
            self.application_running = false;
            return false;
        }
        if self.exit_requested {
            return false;
        }
        info!(state = self.state.as_str(), "exit requested, waiting for the runtime");
        self.exit_requested = true;
        true
    }

    /// Stop the application without waiting for the runtime any longer.
    /// `running` keeps reporting whether the session was actually ended.
    pub fn force_exit(&mut self) {
        warn!(state = self.state.as_str(), "leaving without a clean session exit");
        self.application_running = false;
    }

    fn terminate(&mut self) {
        self.running = false;
        self.application_running = false;
    }
}
