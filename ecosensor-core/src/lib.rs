//! EcoSensor core library
//!
//! Everything the agent binary needs that does not touch the OS:
//! - Sensor configuration model and per-tick immutable snapshots
//! - Hardware snapshot types (best-effort, all sub-readings optional)
//! - Energy estimation model with session/daily accumulation
//! - Daily -> monthly/annual projections, CO2 and cost conversion
//! - CloudEvents 1.0 telemetry envelope construction
//! - Delivery channel contract + HTTP implementation

pub mod config;
pub mod delivery;
pub mod energy;
pub mod events;
pub mod hardware;
pub mod projection;
