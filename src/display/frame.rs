//! Display frame and wire encoding.
//!
//! Wire format: ASCII, six fields in a fixed order, each terminated by `#`:
//!
//! ```text
//! 118.000#121.500#045#On#Moving#Off#
//! ```
//!
//! No trailing newline, no length prefix. The peripheral link has no integrity layer;
//! [`ChecksumMode::Crc8`] is an opt-in extension that appends two hex digits of
//! CRC-8/SMBUS over the frame body after the last delimiter.

use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_8_SMBUS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field terminator on the wire.
pub const DELIMITER: u8 = b'#';

/// Number of fields in every frame.
pub const FIELD_COUNT: usize = 6;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Landing gear leg state as shown on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GearState {
    /// Fully extended and locked (raw position 0)
    On,
    /// Fully retracted (raw position 16383)
    Off,
    /// Anywhere in between
    Moving,
}

impl GearState {
    /// Wire text for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            GearState::On => "On",
            GearState::Off => "Off",
            GearState::Moving => "Moving",
        }
    }
}

impl fmt::Display for GearState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display values for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFrame {
    /// COM1 active frequency, e.g. "118.000"
    pub com1_frequency: String,
    /// COM1 standby frequency, e.g. "121.500"
    pub com1_standby: String,
    /// Magnetic heading, three digits, e.g. "045"
    pub heading: String,
    /// Nose gear
    pub nose_gear: GearState,
    /// Left main gear
    pub left_gear: GearState,
    /// Right main gear
    pub right_gear: GearState,
}

impl DisplayFrame {
    /// Field texts in wire order.
    pub fn fields(&self) -> [&str; FIELD_COUNT] {
        [
            &self.com1_frequency,
            &self.com1_standby,
            &self.heading,
            self.nose_gear.as_str(),
            self.left_gear.as_str(),
            self.right_gear.as_str(),
        ]
    }
}

/// Optional integrity suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Plain frame, as the legacy display expects
    #[default]
    None,
    /// Two upper-case hex digits of CRC-8/SMBUS after the final `#`
    Crc8,
}

/// Serializes frames into wire bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder {
    checksum: ChecksumMode,
}

impl FrameEncoder {
    /// Encoder for the plain legacy format.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder with the given checksum extension.
    pub fn with_checksum(checksum: ChecksumMode) -> Self {
        Self { checksum }
    }

    /// Checksum mode in use.
    pub fn checksum(&self) -> ChecksumMode {
        self.checksum
    }

    /// Encode one frame.
    pub fn encode(&self, frame: &DisplayFrame) -> Bytes {
        let fields = frame.fields();
        let len: usize = fields.iter().map(|f| f.len() + 1).sum();
        let mut buf = BytesMut::with_capacity(len + 2);
        for field in fields {
            buf.put_slice(field.as_bytes());
            buf.put_u8(DELIMITER);
        }
        if self.checksum == ChecksumMode::Crc8 {
            let crc = CRC8.checksum(&buf);
            buf.put_slice(format!("{crc:02X}").as_bytes());
        }
        buf.freeze()
    }
}
