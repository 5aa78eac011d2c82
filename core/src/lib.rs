//! Hardware independent control logic for the triaclight dimmer firmware.
//!
//! Everything in here is pure `no_std` code without any register access.
//! The firmware crate plugs real timers, pins and the serial port in via
//! the [control::DimmerHw] and [proto::Channel] traits. That keeps the
//! whole dimming and protocol logic testable on the host.

#![no_std]

pub mod control;
pub mod levels;
pub mod proto;
pub mod zerocross;

// vim: ts=4 sw=4 expandtab
