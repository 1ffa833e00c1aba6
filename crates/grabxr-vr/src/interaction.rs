//! Per-hand grab state machine over the block set.
//!
//! A free hand tracks the closest block within reach of its grip; pulling the
//! grab action past the threshold picks it up. A held block follows the grip
//! position and snaps to a 10 cm grid when let go.

use glam::Vec3;
use tracing::debug;

use crate::math::{chebyshev_distance, snap_to_grid};
use crate::types::{Block, Hand, HandInputState, PerHand};

/// Blocks must be strictly closer than this (per axis) to be reachable.
pub const GRAB_DISTANCE: f32 = 0.1;
/// Grab value must strictly exceed this to pick up, and release at or below.
pub const GRAB_THRESHOLD: f32 = 0.5;
pub const PICKUP_HAPTIC: f32 = 1.0;
pub const DROP_HAPTIC: f32 = 0.2;
/// Grid points per metre used when a block is dropped.
pub const SNAP_CELLS_PER_METRE: f32 = 10.0;
/// Uniform scale applied when drawing a near or held block.
pub const HIGHLIGHT_SCALE: f32 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GrabState {
    pub grabbed: Option<usize>,
    pub near: Option<usize>,
}

#[derive(Debug, Default)]
pub struct GrabInteractionEngine {
    states: PerHand<GrabState>,
}

impl GrabInteractionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, hand: Hand) -> GrabState {
        self.states[hand]
    }

    /// Near or held by either hand.
    pub fn is_highlighted(&self, index: usize) -> bool {
        self.states.iter().any(|(_, state)| state.near == Some(index))
    }

    /// Scale a block is drawn with this frame.
    pub fn display_scale(&self, index: usize, block: &Block) -> Vec3 {
        if self.is_highlighted(index) {
            block.scale * HIGHLIGHT_SCALE
        } else {
            block.scale
        }
    }

    /// Advance both hands by one frame, left first.
    pub fn update(&mut self, hands: &mut PerHand<HandInputState>, blocks: &mut [Block]) {
        for hand in Hand::ALL {
            self.update_hand(hand, &mut hands[hand], blocks);
        }
    }

    fn update_hand(&mut self, hand: Hand, input: &mut HandInputState, blocks: &mut [Block]) {
        let held_elsewhere = self.states[hand.other()].grabbed;
        let state = &mut self.states[hand];

        let Some(index) = state.grabbed else {
            state.near = if input.grip_active {
                nearest_block(input.grip_pose.position, blocks, held_elsewhere)
            } else {
                None
            };
            if let Some(index) = state.near {
                if input.grab.is_active && input.grab.current_state > GRAB_THRESHOLD {
                    debug!(hand = hand.user_path(), block = index, "block picked up");
                    state.grabbed = Some(index);
                    input.haptic_amplitude = PICKUP_HAPTIC;
                }
            }
            return;
        };

        state.near = Some(index);
        let Some(block) = blocks.get_mut(index) else {
            state.grabbed = None;
            return;
        };
        if input.grip_active {
            block.pose.position = input.grip_pose.position;
        }
        if !input.grab.is_active || input.grab.current_state <= GRAB_THRESHOLD {
            block.pose.position = snap_to_grid(block.pose.position, SNAP_CELLS_PER_METRE);
            debug!(hand = hand.user_path(), block = index, position = ?block.pose.position, "block dropped");
            state.grabbed = None;
            input.haptic_amplitude = DROP_HAPTIC;
        }
    }
}

/// Closest reachable block to `position`; the earliest index wins a tie.
pub fn nearest_block(position: Vec3, blocks: &[Block], exclude: Option<usize>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, block) in blocks.iter().enumerate() {
        if Some(index) == exclude {
            continue;
        }
        let distance = chebyshev_distance(position, block.pose.position);
        if distance >= GRAB_DISTANCE {
            continue;
        }
        if best.map_or(true, |(_, closest)| distance < closest) {
            best = Some((index, distance));
        }
    }
    best.map(|(index, _)| index)
}
