//! Input table fed from inbound I/O events and read back by the producer.
//!
//! Labels look like `PLAYERn_<control>`, `n` being a 1-based port. Button
//! ids follow the libretro joypad numbering so producers written against
//! that convention can query them directly.

use std::cell::Cell;

use crate::constants::{MAX_AXES, MAX_BUTTONS, MAX_PORTS};
use crate::event::{InputValue, IoEvent};

pub const BUTTON_B: usize = 0;
pub const BUTTON_Y: usize = 1;
pub const BUTTON_SELECT: usize = 2;
pub const BUTTON_START: usize = 3;
pub const BUTTON_UP: usize = 4;
pub const BUTTON_DOWN: usize = 5;
pub const BUTTON_LEFT: usize = 6;
pub const BUTTON_RIGHT: usize = 7;
pub const BUTTON_A: usize = 8;
pub const BUTTON_X: usize = 9;
pub const BUTTON_L: usize = 10;
pub const BUTTON_R: usize = 11;

/// `BUTTON1..BUTTON6` map through this table, in A/B/X/Y/L/R order.
const REMAP: [usize; 6] = [BUTTON_A, BUTTON_B, BUTTON_X, BUTTON_Y, BUTTON_L, BUTTON_R];
const REMAP_NAMES: [&str; 6] = ["A", "B", "X", "Y", "L", "R"];

pub const DEVICE_NONE: u32 = 0;
pub const DEVICE_JOYPAD: u32 = 1;
pub const DEVICE_MOUSE: u32 = 2;
pub const DEVICE_KEYBOARD: u32 = 3;
pub const DEVICE_LIGHTGUN: u32 = 4;
pub const DEVICE_ANALOG: u32 = 5;

/// Device classes a producer can query, numbered like libretro devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    None,
    Joypad,
    Mouse,
    Keyboard,
    Lightgun,
    Analog,
    Unknown(u32),
}

impl From<u32> for DeviceClass {
    fn from(value: u32) -> Self {
        match value {
            DEVICE_NONE => DeviceClass::None,
            DEVICE_JOYPAD => DeviceClass::Joypad,
            DEVICE_MOUSE => DeviceClass::Mouse,
            DEVICE_KEYBOARD => DeviceClass::Keyboard,
            DEVICE_LIGHTGUN => DeviceClass::Lightgun,
            DEVICE_ANALOG => DeviceClass::Analog,
            other => DeviceClass::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownLabel,
    PortOutOfRange,
    ButtonOutOfRange,
    AxisOutOfRange,
}

/// What applying one I/O event did to the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputUpdate {
    Button {
        port: usize,
        button: usize,
        pressed: bool,
    },
    Axis {
        axis: usize,
        value: i16,
    },
    Ignored(IgnoreReason),
}

enum Control {
    Button(usize),
    Axis(usize),
}

const WARNED_MOUSE: u8 = 1;
const WARNED_LIGHTGUN: u8 = 2;

#[derive(Debug, Default)]
pub struct InputState {
    joypad: [[bool; MAX_BUTTONS]; MAX_PORTS],
    axis: [i16; MAX_AXES],
    warned: Cell<u8>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn joypad(&self, port: usize, button: usize) -> bool {
        self.joypad
            .get(port)
            .and_then(|buttons| buttons.get(button))
            .copied()
            .unwrap_or(false)
    }

    pub fn axis(&self, axis: usize) -> i16 {
        self.axis.get(axis).copied().unwrap_or(0)
    }

    /// Decodes a labelled I/O event and writes it into the table. Anything
    /// not understood is reported as `Ignored` and leaves the table unchanged.
    pub fn apply(&mut self, event: &IoEvent) -> InputUpdate {
        let (port, control) = match parse_label(event.label.as_str()) {
            Ok(parsed) => parsed,
            Err(reason) => return InputUpdate::Ignored(reason),
        };
        match control {
            Control::Button(button) => {
                let pressed = match event.value {
                    InputValue::Digital(pressed) => pressed,
                    InputValue::Analog(value) => value != 0,
                };
                self.joypad[port][button] = pressed;
                InputUpdate::Button {
                    port,
                    button,
                    pressed,
                }
            }
            Control::Axis(axis) => {
                let value = match event.value {
                    InputValue::Digital(true) => i16::MAX,
                    InputValue::Digital(false) => 0,
                    InputValue::Analog(value) => value,
                };
                self.axis[axis] = value;
                InputUpdate::Axis { axis, value }
            }
        }
    }

    /// Producer-facing query. Unsupported devices and out-of-range indices
    /// read as 0.
    pub fn query(&self, port: u32, device: u32, index: u32, id: u32) -> i16 {
        match DeviceClass::from(device) {
            DeviceClass::Joypad => self.joypad(port as usize, id as usize) as i16,
            DeviceClass::Analog if index == 0 => self.axis(id as usize),
            DeviceClass::Analog => 0,
            DeviceClass::Mouse => {
                self.warn_once(WARNED_MOUSE, "mouse");
                0
            }
            DeviceClass::Lightgun => {
                self.warn_once(WARNED_LIGHTGUN, "lightgun");
                0
            }
            other => {
                tracing::debug!(?other, "input requested for unsupported device");
                0
            }
        }
    }

    fn warn_once(&self, bit: u8, device: &str) {
        let warned = self.warned.get();
        if warned & bit == 0 {
            self.warned.set(warned | bit);
            tracing::warn!(device, "input requested for unsupported device");
        }
    }
}

fn parse_label(label: &str) -> Result<(usize, Control), IgnoreReason> {
    let rest = label
        .strip_prefix("PLAYER")
        .ok_or(IgnoreReason::UnknownLabel)?;
    let (digits, subtype) = rest.split_once('_').ok_or(IgnoreReason::UnknownLabel)?;
    let port: usize = digits.parse().map_err(|_| IgnoreReason::UnknownLabel)?;
    if port == 0 || port > MAX_PORTS {
        return Err(IgnoreReason::PortOutOfRange);
    }
    let port = port - 1;

    let control = match subtype {
        "UP" => Control::Button(BUTTON_UP),
        "DOWN" => Control::Button(BUTTON_DOWN),
        "LEFT" => Control::Button(BUTTON_LEFT),
        "RIGHT" => Control::Button(BUTTON_RIGHT),
        "SELECT" => Control::Button(BUTTON_SELECT),
        "START" => Control::Button(BUTTON_START),
        _ => {
            if let Some(button) = subtype.strip_prefix("BUTTON") {
                Control::Button(parse_button(button)?)
            } else if let Some(axis) = subtype.strip_prefix("AXIS") {
                let axis: usize = axis.parse().map_err(|_| IgnoreReason::UnknownLabel)?;
                if axis == 0 || axis > MAX_AXES {
                    return Err(IgnoreReason::AxisOutOfRange);
                }
                Control::Axis(axis - 1)
            } else {
                return Err(IgnoreReason::UnknownLabel);
            }
        }
    };
    Ok((port, control))
}

fn parse_button(name: &str) -> Result<usize, IgnoreReason> {
    if let Some(pos) = REMAP_NAMES.iter().position(|n| *n == name) {
        return Ok(REMAP[pos]);
    }
    let index: usize = name.parse().map_err(|_| IgnoreReason::UnknownLabel)?;
    if index == 0 || index > REMAP.len() {
        return Err(IgnoreReason::ButtonOutOfRange);
    }
    Ok(REMAP[index - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Label;

    fn io(label: &str, value: InputValue) -> IoEvent {
        IoEvent {
            label: Label::new(label).unwrap(),
            value,
        }
    }

    #[test]
    fn named_button_press_and_release() {
        let mut input = InputState::new();
        let update = input.apply(&io("PLAYER1_BUTTONA", InputValue::Digital(true)));
        assert_eq!(
            update,
            InputUpdate::Button {
                port: 0,
                button: BUTTON_A,
                pressed: true
            }
        );
        assert!(input.joypad(0, BUTTON_A));
        assert_eq!(input.query(0, 1, 0, BUTTON_A as u32), 1);

        input.apply(&io("PLAYER1_BUTTONA", InputValue::Digital(false)));
        assert!(!input.joypad(0, BUTTON_A));
    }

    #[test]
    fn numbered_buttons_go_through_the_remap_table() {
        let mut input = InputState::new();
        input.apply(&io("PLAYER2_BUTTON2", InputValue::Digital(true)));
        input.apply(&io("PLAYER2_BUTTON6", InputValue::Analog(3)));
        assert!(input.joypad(1, BUTTON_B));
        assert!(input.joypad(1, BUTTON_R));
        assert_eq!(
            input.apply(&io("PLAYER2_BUTTON7", InputValue::Digital(true))),
            InputUpdate::Ignored(IgnoreReason::ButtonOutOfRange)
        );
    }

    #[test]
    fn directions_and_meta_buttons() {
        let mut input = InputState::new();
        for (label, button) in [
            ("PLAYER4_UP", BUTTON_UP),
            ("PLAYER4_DOWN", BUTTON_DOWN),
            ("PLAYER4_LEFT", BUTTON_LEFT),
            ("PLAYER4_RIGHT", BUTTON_RIGHT),
            ("PLAYER4_SELECT", BUTTON_SELECT),
            ("PLAYER4_START", BUTTON_START),
        ] {
            input.apply(&io(label, InputValue::Digital(true)));
            assert!(input.joypad(3, button), "{label}");
        }
    }

    #[test]
    fn out_of_range_ports_leave_the_table_unchanged() {
        let mut input = InputState::new();
        assert_eq!(
            input.apply(&io("PLAYER9_UP", InputValue::Digital(true))),
            InputUpdate::Ignored(IgnoreReason::PortOutOfRange)
        );
        assert_eq!(
            input.apply(&io("PLAYER0_UP", InputValue::Digital(true))),
            InputUpdate::Ignored(IgnoreReason::PortOutOfRange)
        );
        for port in 0..MAX_PORTS {
            for button in 0..MAX_BUTTONS {
                assert!(!input.joypad(port, button));
            }
        }
    }

    #[test]
    fn unknown_labels_are_ignored() {
        let mut input = InputState::new();
        for label in ["MOUSE_X", "PLAYER1", "PLAYERX_UP", "PLAYER1_JUMP", "PLAYER1_BUTTONQ"] {
            assert_eq!(
                input.apply(&io(label, InputValue::Digital(true))),
                InputUpdate::Ignored(IgnoreReason::UnknownLabel),
                "{label}"
            );
        }
    }

    #[test]
    fn axes_take_analog_values() {
        let mut input = InputState::new();
        input.apply(&io("PLAYER1_AXIS2", InputValue::Analog(-1200)));
        assert_eq!(input.axis(1), -1200);
        assert_eq!(input.query(0, 5, 0, 1), -1200);
        assert_eq!(input.query(0, 5, 1, 1), 0);
        assert_eq!(
            input.apply(&io("PLAYER1_AXIS3", InputValue::Analog(5))),
            InputUpdate::Ignored(IgnoreReason::AxisOutOfRange)
        );
    }

    #[test]
    fn unsupported_devices_read_as_zero() {
        let input = InputState::new();
        assert_eq!(input.query(0, 2, 0, 0), 0);
        assert_eq!(input.query(0, 4, 0, 0), 0);
        assert_eq!(input.query(0, 77, 0, 0), 0);
        assert_eq!(input.query(9, 1, 0, 40), 0);
    }
}
