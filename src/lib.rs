//! Command line front end and fixture wiring for the accounts gateway access core.

pub mod cli;
pub mod fixtures;

pub use fixtures::{
    load_fixture, parse_fixture, run_simulation, GatewayStack, SimulationFixture,
    SimulationReport, SimulationStep,
};
