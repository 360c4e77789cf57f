//! Javelin Rig
//!
//! Unattended parameter search for a console throwing event: a
//! microcontroller plays back timed button sequences on a gamepad while a
//! capture card watches the screen and reads the distance of every throw.

pub mod campaign;
pub mod cancel;
pub mod capture;
pub mod config;
pub mod firmware;
pub mod link;
pub mod logging;
pub mod paths;
pub mod persistence;
pub mod protocol;
pub mod recognition;
