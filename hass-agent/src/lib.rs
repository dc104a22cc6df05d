//! Host telemetry agent for Home Assistant
//!
//! Samples machine health (CPU, memory, disks, network, reachability) and
//! publishes it as MQTT discovery sensors. The binary in `main.rs` wires the
//! pieces together; everything here is usable on its own.

pub mod agents;
pub mod backoff;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod mqtt;
pub mod naming;
pub mod network;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod throttle;

pub use error::{AgentError, MailboxError, ProbeError, Result};
