#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod can;
pub mod config;
pub mod control;
pub mod debounce;
pub mod dti;
pub mod ecu;
pub mod error;
pub mod fault;
pub mod menu;
pub mod monitor;
pub mod pedals;
pub mod state_machine;
pub mod steering;
pub mod torque;
pub mod traits;

pub use ecu::Ecu;
pub use error::{ConfigError, QueueFull, SensorError, TransportError};
