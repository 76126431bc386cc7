//! LED controller command frames.
//!
//! Every command is a fixed 9-byte frame:
//!
//! - Colour: `7E 00 05 03 RR GG BB 00 EF`
//! - Brightness: `7E 00 01 BB 00 00 00 00 EF`
//!
//! There is no length or checksum field, and the controller never replies to a write.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of every command frame in bytes.
pub const FRAME_LEN: usize = 9;

/// First byte of every frame.
pub const FRAME_START: u8 = 0x7E;

/// Last byte of every frame.
pub const FRAME_END: u8 = 0xEF;

/// Largest brightness value the controller accepts.
pub const MAX_BRIGHTNESS: u8 = 100;

const COLOUR_OPCODE: [u8; 2] = [0x05, 0x03];
const BRIGHTNESS_OPCODE: u8 = 0x01;

/// An encoded command, ready to be written to the characteristic.
pub type Frame = [u8; FRAME_LEN];

/// Set the RGB output of the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColourCommand {
    /// Red channel.
    pub red: u8,
    /// Green channel.
    pub green: u8,
    /// Blue channel.
    pub blue: u8,
}

impl ColourCommand {
    /// Create a colour command from raw channel values.
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Encode to the wire frame.
    pub fn to_bytes(&self) -> Frame {
        [
            FRAME_START,
            0x00,
            COLOUR_OPCODE[0],
            COLOUR_OPCODE[1],
            self.red,
            self.green,
            self.blue,
            0x00,
            FRAME_END,
        ]
    }
}

/// Parses six hex digits, e.g. `"FF00EE"`. A leading `#` is accepted.
impl FromStr for ColourCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidParameter {
            name: "colour".to_string(),
            value: s.to_string(),
        };

        let digits = s.strip_prefix('#').unwrap_or(s);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
        };

        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for ColourCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

/// Set the output brightness of the strip.
///
/// The controller takes a raw value from 0 to [`MAX_BRIGHTNESS`]. Larger inputs are
/// clamped on construction, so an encoded frame never carries an out-of-range value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "u8", into = "u8"))]
pub struct BrightnessCommand {
    brightness: u8,
}

impl BrightnessCommand {
    /// Create a brightness command, clamping `brightness` to `0..=100`.
    pub fn new(brightness: u8) -> Self {
        Self {
            brightness: brightness.min(MAX_BRIGHTNESS),
        }
    }

    /// The (clamped) brightness value.
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Encode to the wire frame.
    pub fn to_bytes(&self) -> Frame {
        [
            FRAME_START,
            0x00,
            BRIGHTNESS_OPCODE,
            self.brightness,
            0x00,
            0x00,
            0x00,
            0x00,
            FRAME_END,
        ]
    }
}

impl From<u8> for BrightnessCommand {
    fn from(brightness: u8) -> Self {
        Self::new(brightness)
    }
}

impl From<BrightnessCommand> for u8 {
    fn from(command: BrightnessCommand) -> Self {
        command.brightness
    }
}

/// Any command understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Change the colour.
    Colour(ColourCommand),
    /// Change the brightness.
    Brightness(BrightnessCommand),
}

impl Command {
    /// Encode to the wire frame.
    pub fn encode(&self) -> Frame {
        match self {
            Self::Colour(colour) => colour.to_bytes(),
            Self::Brightness(brightness) => brightness.to_bytes(),
        }
    }
}

impl From<ColourCommand> for Command {
    fn from(command: ColourCommand) -> Self {
        Self::Colour(command)
    }
}

impl From<BrightnessCommand> for Command {
    fn from(command: BrightnessCommand) -> Self {
        Self::Brightness(command)
    }
}

/// Encode a command to its wire frame.
pub fn encode(command: &Command) -> Frame {
    command.encode()
}
