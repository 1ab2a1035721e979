//! ESP32 implementations of the `bringup-core` component traits.

pub mod clock;
pub mod log;
pub mod power;
pub mod reset;
pub mod retained;
pub mod sdcard;
pub mod sntp;
pub mod wifi;
