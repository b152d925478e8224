//! Pre-flight simulation of user operations.
//!
//! [`PreflightSimulator`] submits `handleOps` (or `simulateValidation`) to a
//! [`SimulationEngine`] and reduces the returned trace to a
//! [`userop_core::SimulationResult`]. [`ScenarioSuite`] reproduces the ERC-4337 validation
//! error codes by corrupting a valid operation one field at a time.

mod engine;
mod error;
mod scenarios;
mod simulator;
mod trace;

pub use engine::SimulationEngine;
pub use error::{Result, SimulatorError};
pub use scenarios::{Scenario, ScenarioBase, ScenarioReport, ScenarioSuite, paymaster_window};
pub use simulator::{PreflightSimulator, SimulationMode, SimulatorConfig};
pub use trace::extract_outcome;
