//! Gamepad input handling using gilrs.
//!
//! `InputHub` polls connected gamepads once per frame, auto-assigns them to
//! joypad ports in connection order, and converts their state into per-port
//! button masks indexed by joypad id. The frontend's keyboard state arrives
//! separately through the shared-memory channel; [`digital_state`] merges the
//! two views the way the core queries them.

use std::collections::HashMap;
use std::time::Duration;

use gilrs::{
    Axis, Button, Event, EventType, GamepadId, Gilrs,
    ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Replay, Ticks},
};

use retrodock_abi as abi;

use crate::error::HostError;

/// Ports the host exposes to cores.
pub const MAX_PORTS: usize = 4;

const AXIS_THRESHOLD: f32 = 0.5;

pub struct InputHub {
    gilrs: Gilrs,
    /// Maps gilrs ids to assigned ports.
    port_assignments: HashMap<GamepadId, usize>,
    /// One bit per joypad id, per port.
    masks: [u16; MAX_PORTS],
    /// Active rumble effect per port, kept alive while playing.
    effects: [Option<Effect>; MAX_PORTS],
}

impl InputHub {
    pub fn new() -> Result<Self, HostError> {
        let gilrs = Gilrs::new().map_err(|e| {
            tracing::error!("failed to initialize gilrs: {e}");
            HostError::Input(e.to_string())
        })?;

        let mut hub = Self {
            gilrs,
            port_assignments: HashMap::new(),
            masks: [0; MAX_PORTS],
            effects: [const { None }; MAX_PORTS],
        };
        // Pads plugged in before startup produce no Connected event.
        let preconnected: Vec<GamepadId> = hub
            .gilrs
            .gamepads()
            .filter(|(_, gp)| gp.is_connected())
            .map(|(id, _)| id)
            .collect();
        for id in preconnected {
            hub.assign(id);
        }
        Ok(hub)
    }

    /// Processes pending connect/disconnect events and refreshes the per-port
    /// button masks. Call once per frame, from the input-poll callback.
    pub fn poll(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    let name = self.gilrs.gamepad(id).name().to_owned();
                    tracing::info!(%name, ?id, "gamepad connected");
                    self.assign(id);
                }
                EventType::Disconnected => {
                    tracing::info!(?id, "gamepad disconnected");
                    self.unassign(id);
                }
                _ => {}
            }
        }

        self.masks = [0; MAX_PORTS];
        for (gamepad_id, port) in &self.port_assignments {
            if let Some(gamepad) = self.gilrs.connected_gamepad(*gamepad_id) {
                self.masks[*port] = read_mask(&gamepad);
            }
        }
    }

    pub fn masks(&self) -> [u16; MAX_PORTS] {
        self.masks
    }

    pub fn tracked_pads(&self) -> usize {
        self.port_assignments.len()
    }

    /// Starts (or replaces) a rumble effect on the pad assigned to `port`.
    /// Ports without a pad succeed silently, matching how cores probe rumble.
    pub fn rumble(&mut self, port: usize, strength: f32, duration: Duration) -> Result<(), HostError> {
        if port >= MAX_PORTS {
            return Err(HostError::Input(format!("invalid port: {port}")));
        }
        let Some(id) = self
            .port_assignments
            .iter()
            .find(|(_, p)| **p == port)
            .map(|(id, _)| *id)
        else {
            return Ok(());
        };

        let strength = strength.clamp(0.0, 1.0);
        if strength == 0.0 {
            // Strength zero stops the running effect.
            self.effects[port] = None;
            return Ok(());
        }

        let effect = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind: BaseEffectType::Strong {
                    magnitude: (strength * 65535.0) as u16,
                },
                scheduling: Replay {
                    play_for: Ticks::from_ms(duration.as_millis() as u32),
                    ..Default::default()
                },
                ..Default::default()
            })
            .gamepads(&[id])
            .finish(&mut self.gilrs)
            .map_err(|e| HostError::Input(format!("failed to create rumble effect: {e:?}")))?;
        effect
            .play()
            .map_err(|e| HostError::Input(format!("failed to play rumble effect: {e:?}")))?;
        self.effects[port] = Some(effect);
        Ok(())
    }

    fn assign(&mut self, id: GamepadId) {
        if self.port_assignments.contains_key(&id) {
            return;
        }
        let taken: Vec<usize> = self.port_assignments.values().copied().collect();
        let Some(port) = (0..MAX_PORTS).find(|p| !taken.contains(p)) else {
            tracing::warn!(?id, "all ports occupied, gamepad left unassigned");
            return;
        };
        tracing::info!(?id, port, "gamepad assigned");
        self.port_assignments.insert(id, port);
    }

    fn unassign(&mut self, id: GamepadId) {
        if let Some(port) = self.port_assignments.remove(&id) {
            self.masks[port] = 0;
            self.effects[port] = None;
            // Lower-numbered ports must stay dense so player 1 never goes
            // dark when player 2 unplugs.
            self.compact_ports();
        }
    }

    fn compact_ports(&mut self) {
        let mut ids: Vec<GamepadId> = self.port_assignments.keys().copied().collect();
        ids.sort_by_key(|id| self.port_assignments[id]);
        self.port_assignments.clear();
        for (port, id) in ids.into_iter().enumerate() {
            self.port_assignments.insert(id, port);
        }
    }
}

/// Reads one pad's current state into a joypad-id bitmask.
fn read_mask(gamepad: &gilrs::Gamepad<'_>) -> u16 {
    let mut mask = 0u16;
    let mut set = |id: u32, pressed: bool| {
        if pressed {
            mask |= 1 << id;
        }
    };

    set(abi::RETRO_DEVICE_ID_JOYPAD_B, gamepad.is_pressed(Button::South));
    set(abi::RETRO_DEVICE_ID_JOYPAD_A, gamepad.is_pressed(Button::East));
    set(abi::RETRO_DEVICE_ID_JOYPAD_Y, gamepad.is_pressed(Button::West));
    set(abi::RETRO_DEVICE_ID_JOYPAD_X, gamepad.is_pressed(Button::North));
    set(abi::RETRO_DEVICE_ID_JOYPAD_SELECT, gamepad.is_pressed(Button::Select));
    set(abi::RETRO_DEVICE_ID_JOYPAD_START, gamepad.is_pressed(Button::Start));
    set(abi::RETRO_DEVICE_ID_JOYPAD_L, gamepad.is_pressed(Button::LeftTrigger));
    set(abi::RETRO_DEVICE_ID_JOYPAD_R, gamepad.is_pressed(Button::RightTrigger));
    set(abi::RETRO_DEVICE_ID_JOYPAD_L2, gamepad.is_pressed(Button::LeftTrigger2));
    set(abi::RETRO_DEVICE_ID_JOYPAD_R2, gamepad.is_pressed(Button::RightTrigger2));
    set(abi::RETRO_DEVICE_ID_JOYPAD_L3, gamepad.is_pressed(Button::LeftThumb));
    set(abi::RETRO_DEVICE_ID_JOYPAD_R3, gamepad.is_pressed(Button::RightThumb));

    // D-pad from buttons, with the left stick as a fallback.
    let axis = |a: Axis| gamepad.axis_data(a).map(|d| d.value()).unwrap_or(0.0);
    let (lx, ly) = (axis(Axis::LeftStickX), axis(Axis::LeftStickY));
    set(
        abi::RETRO_DEVICE_ID_JOYPAD_UP,
        gamepad.is_pressed(Button::DPadUp) || ly > AXIS_THRESHOLD,
    );
    set(
        abi::RETRO_DEVICE_ID_JOYPAD_DOWN,
        gamepad.is_pressed(Button::DPadDown) || ly < -AXIS_THRESHOLD,
    );
    set(
        abi::RETRO_DEVICE_ID_JOYPAD_LEFT,
        gamepad.is_pressed(Button::DPadLeft) || lx < -AXIS_THRESHOLD,
    );
    set(
        abi::RETRO_DEVICE_ID_JOYPAD_RIGHT,
        gamepad.is_pressed(Button::DPadRight) || lx > AXIS_THRESHOLD,
    );

    mask
}

/// Resolves one digital input query against pad masks and the keyboard block.
///
/// When no pads are tracked the keyboard answers for every port; otherwise
/// keyboard state still augments port 0, so a keyboard player is never locked
/// out by a plugged-in pad.
pub fn digital_state(
    masks: &[u16; MAX_PORTS],
    tracked_pads: usize,
    keyboard: &[i16; abi::RETRO_JOYPAD_ID_COUNT],
    port: u32,
    id: u32,
) -> i16 {
    if id as usize >= abi::RETRO_JOYPAD_ID_COUNT || port as usize >= MAX_PORTS {
        return 0;
    }
    let key = keyboard[id as usize];
    if tracked_pads == 0 {
        return i16::from(key != 0);
    }
    let pad = masks[port as usize] & (1 << id) != 0;
    let pressed = pad || (port == 0 && key != 0);
    i16::from(pressed)
}
