//! Typed events carried by the embedded queues.

use crate::constants::EVENT_LABEL_LEN;
use crate::error::{FsrvError, Result};
use crate::layout::EventRecord;

const CATEGORY_IO: u8 = 1;
const CATEGORY_CONTROL: u8 = 2;
const CATEGORY_OTHER: u8 = 3;

const IO_DIGITAL: u8 = 0;
const IO_ANALOG: u8 = 1;

const CONTROL_RESET: u8 = 1;
const CONTROL_IDENT: u8 = 2;

/// Inline, length-prefixed event label.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Label {
    bytes: [u8; EVENT_LABEL_LEN],
    len: u8,
}

impl Label {
    pub fn new(text: &str) -> Result<Self> {
        if text.len() > EVENT_LABEL_LEN {
            return Err(FsrvError::LabelTooLong {
                max: EVENT_LABEL_LEN,
            });
        }
        let mut bytes = [0u8; EVENT_LABEL_LEN];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        Ok(Self {
            bytes,
            len: text.len() as u8,
        })
    }

    /// Builds a label from a string that may be too long, cutting it at a
    /// character boundary.
    pub fn truncated(text: &str) -> Self {
        let mut end = text.len().min(EVENT_LABEL_LEN);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Self::new(&text[..end]).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    fn from_record(record: &EventRecord) -> Self {
        let len = (record.label_len as usize).min(EVENT_LABEL_LEN);
        let mut bytes = [0u8; EVENT_LABEL_LEN];
        bytes[..len].copy_from_slice(&record.label[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }
}

impl Default for Label {
    fn default() -> Self {
        Self {
            bytes: [0; EVENT_LABEL_LEN],
            len: 0,
        }
    }
}

impl std::fmt::Debug for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputValue {
    Digital(bool),
    Analog(i16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoEvent {
    pub label: Label,
    pub value: InputValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    /// Parent asks the producer to reset.
    Reset,
    /// Child announces the producer it runs.
    Ident(Label),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Io(IoEvent),
    Control(ControlEvent),
    Other { kind: u8, value: i32, label: Label },
}

impl Event {
    /// Digital input event, e.g. `Event::digital("PLAYER1_BUTTONA", true)`.
    pub fn digital(label: &str, pressed: bool) -> Result<Self> {
        Ok(Event::Io(IoEvent {
            label: Label::new(label)?,
            value: InputValue::Digital(pressed),
        }))
    }

    pub fn analog(label: &str, value: i16) -> Result<Self> {
        Ok(Event::Io(IoEvent {
            label: Label::new(label)?,
            value: InputValue::Analog(value),
        }))
    }

    pub fn to_record(&self) -> EventRecord {
        let (category, kind, value, label) = match *self {
            Event::Io(io) => match io.value {
                InputValue::Digital(pressed) => (CATEGORY_IO, IO_DIGITAL, pressed as i32, io.label),
                InputValue::Analog(v) => (CATEGORY_IO, IO_ANALOG, v as i32, io.label),
            },
            Event::Control(ControlEvent::Reset) => {
                (CATEGORY_CONTROL, CONTROL_RESET, 0, Label::default())
            }
            Event::Control(ControlEvent::Ident(label)) => {
                (CATEGORY_CONTROL, CONTROL_IDENT, 0, label)
            }
            Event::Other { kind, value, label } => (CATEGORY_OTHER, kind, value, label),
        };
        EventRecord {
            category,
            kind,
            label_len: label.len,
            reserved: 0,
            value,
            label: label.bytes,
        }
    }

    /// `None` for records whose category or kind this revision does not know.
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        let label = Label::from_record(record);
        match (record.category, record.kind) {
            (CATEGORY_IO, IO_DIGITAL) => Some(Event::Io(IoEvent {
                label,
                value: InputValue::Digital(record.value != 0),
            })),
            (CATEGORY_IO, IO_ANALOG) => Some(Event::Io(IoEvent {
                label,
                value: InputValue::Analog(
                    record.value.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
                ),
            })),
            (CATEGORY_CONTROL, CONTROL_RESET) => Some(Event::Control(ControlEvent::Reset)),
            (CATEGORY_CONTROL, CONTROL_IDENT) => Some(Event::Control(ControlEvent::Ident(label))),
            (CATEGORY_OTHER, kind) => Some(Event::Other {
                kind,
                value: record.value,
                label,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_longer_than_a_record_are_rejected() {
        let long = "PLAYER1_BUTTON_WITH_A_VERY_LONG_NAME";
        assert_eq!(
            Label::new(long).unwrap_err(),
            FsrvError::LabelTooLong {
                max: EVENT_LABEL_LEN
            }
        );
        assert_eq!(Label::truncated(long).as_str(), &long[..EVENT_LABEL_LEN]);
    }

    #[test]
    fn io_event_survives_the_record_format() {
        let event = Event::digital("PLAYER2_START", true).unwrap();
        let record = event.to_record();
        assert_eq!(record.category, CATEGORY_IO);
        assert_eq!(record.label_len as usize, "PLAYER2_START".len());
        assert_eq!(Event::from_record(&record), Some(event));
    }

    #[test]
    fn analog_values_are_clamped_on_decode() {
        let mut record = Event::analog("PLAYER1_AXIS1", 0).unwrap().to_record();
        record.value = 1 << 20;
        match Event::from_record(&record) {
            Some(Event::Io(io)) => assert_eq!(io.value, InputValue::Analog(i16::MAX)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_categories_decode_to_nothing() {
        let record = EventRecord {
            category: 42,
            ..EventRecord::EMPTY
        };
        assert_eq!(Event::from_record(&record), None);
        let record = EventRecord {
            category: CATEGORY_CONTROL,
            kind: 99,
            ..EventRecord::EMPTY
        };
        assert_eq!(Event::from_record(&record), None);
    }
}
