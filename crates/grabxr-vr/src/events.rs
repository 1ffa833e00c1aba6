use tracing::{debug, info, warn};

use crate::lifecycle::SessionLifecycle;
use crate::runtime::XrRuntime;
use crate::types::{Hand, PerHand, RuntimeEvent};
use crate::XrResult;

/// Drains the runtime event queue once per loop iteration.
#[derive(Debug, Default)]
pub struct EventPump {
    profiles: PerHand<Option<String>>,
    events_lost: u64,
    processed: u64,
}

impl EventPump {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interaction profile last reported for a hand.
    pub fn interaction_profile(&self, hand: Hand) -> Option<&str> {
        self.profiles[hand].as_deref()
    }

    pub fn events_lost(&self) -> u64 {
        self.events_lost
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Poll until the queue reports empty. Never blocks.
    ///
    /// Only a failed poll or a failed session begin/end is returned; every
    /// other problem is logged.
    pub fn pump<R: XrRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        lifecycle: &mut SessionLifecycle,
    ) -> XrResult<()> {
        while let Some(event) = runtime.poll_event()? {
            self.processed += 1;
            match event {
                RuntimeEvent::EventsLost { count } => {
                    warn!(count, "runtime event queue overflowed");
                    self.events_lost += u64::from(count);
                }
                RuntimeEvent::InstanceLossPending { loss_time } => {
                    warn!(loss_time = loss_time.as_nanos(), "instance loss pending");
                    lifecycle.on_instance_loss_pending();
                }
                RuntimeEvent::InteractionProfileChanged => {
                    self.refresh_profiles(runtime);
                }
                RuntimeEvent::ReferenceSpaceChangePending { change_time } => {
                    info!(
                        change_time = change_time.as_nanos(),
                        "reference space change pending"
                    );
                }
                RuntimeEvent::SessionStateChanged { state, time } => {
                    debug!(time = time.as_nanos(), state = state.as_str(), "state event");
                    lifecycle.on_state_changed(state, runtime)?;
                }
                RuntimeEvent::Other => {}
            }
        }
        Ok(())
    }

    fn refresh_profiles<R: XrRuntime + ?Sized>(&mut self, runtime: &R) {
        for hand in Hand::ALL {
            match runtime.current_interaction_profile(hand) {
                Ok(profile) => {
                    info!(
                        hand = hand.user_path(),
                        profile = profile.as_deref().unwrap_or("none"),
                        "interaction profile changed"
                    );
                    self.profiles[hand] = profile;
                }
                Err(err) => warn!(hand = hand.user_path(), "interaction profile query failed: {err}"),
            }
        }
    }
}
