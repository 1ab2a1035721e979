#![no_std]

// Portable bring-up and fault-recovery logic for the time-lapse camera.
//
// Every hardware concern is reached through a trait so the same orchestrator
// runs on the ESP32 firmware, the host emulator, and the test suite.

pub mod clock;
pub mod config;
pub mod counter;
pub mod journal;
pub mod network;
pub mod orchestrator;
pub mod power;
pub mod reset;
pub mod storage;
pub mod supervisor;
pub mod timesync;

#[cfg(test)]
mod mock;
