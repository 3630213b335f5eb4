//! Input handling for the session
//!
//! Buttons are edge-triggered: an action fires on the tick a button goes
//! down and not again until it has been released.

use crate::host::{Button, Host};
use crate::utils::config::InputConfig;

/// What the user asked for this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Move the playback position by this many seconds
    Seek { seconds: i64 },

    /// Switch to the next audio track
    CycleAudio,

    /// Switch to the next subtitle track
    CycleSubtitle,
}

/// Edge detector over the host's buttons
#[derive(Debug, Clone)]
pub struct InputController {
    seek_step: i64,
    fast_seek_step: i64,
    held: [bool; Button::COUNT],
}

impl InputController {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            seek_step: config.seek_step_secs as i64,
            fast_seek_step: config.fast_seek_step_secs as i64,
            held: [false; Button::COUNT],
        }
    }

    /// Read button state from the host and return newly triggered actions
    ///
    /// Seek presses landing on the same tick are summed into one seek.
    pub fn poll(&mut self, host: &mut dyn Host) -> Vec<InputAction> {
        let mut actions = Vec::new();
        let mut seek = 0;

        for (held, &button) in self.held.iter_mut().zip(Button::ALL.iter()) {
            let pressed = host.input_state(button);
            let edge = pressed && !*held;
            *held = pressed;

            if !edge {
                continue;
            }

            match button {
                Button::Left => seek -= self.seek_step,
                Button::Right => seek += self.seek_step,
                Button::Up => seek += self.fast_seek_step,
                Button::Down => seek -= self.fast_seek_step,
                Button::L => actions.push(InputAction::CycleAudio),
                Button::R => actions.push(InputAction::CycleSubtitle),
            }
        }

        if seek != 0 {
            actions.insert(0, InputAction::Seek { seconds: seek });
        }
        actions
    }
}
