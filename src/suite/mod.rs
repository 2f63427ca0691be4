//! TOML test suites
//!
//! A suite names the application environment, suite-wide flags and the list
//! of tests. Loading merges everything into self-contained [`TestCase`]s.

mod config;
mod credentials;
mod loader;

pub use config::{
    CredentialsConfig, EnvironmentConfig, FlagOverrides, SuiteFile, TestEntry, TestFlags,
    TestKind,
};
pub use credentials::Credentials;
pub use loader::{load_suite, Environment, LoadedSuite, TestCase};
