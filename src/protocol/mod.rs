//! Protocol module for constructing command frames.
//!
//! The controller's protocol is write-only apart from an opaque state read,
//! so only encoding lives here.

pub mod commands;

pub use commands::{
    encode, BrightnessCommand, ColourCommand, Command, Frame, FRAME_LEN, MAX_BRIGHTNESS,
};
