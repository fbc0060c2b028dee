//! Shared configuration surface for the elastikv controller.
//!
//! All configuration is immutable after load: each subsystem receives its
//! section by value at construction time. Nothing in here is consulted at
//! runtime through globals.

mod config;

pub use config::{AppConfig, ControlConfig, FleetConfig, PartitionConfig};
