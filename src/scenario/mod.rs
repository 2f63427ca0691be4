//! Scenario scripts
//!
//! Scenarios are pytest scripts that drive the application through the
//! vendor UI-automation SDK (or exercise it from the command line). The
//! harness only runs them and judges the session summary.

mod pytest;
mod run;

pub use pytest::{judge, PytestSummary, NO_TESTS_COLLECTED};
pub use run::{run_scenario, ScenarioCommand, ScenarioOutcome};
