//! Test queue: status/result records and the iteration controller

mod controller;
mod result;

pub use controller::{FollowUp, IterationController, QueueEntry, QueueSummary, MAX_ATTEMPTS};
pub use result::{Artifacts, TestOutcome, TestResult, TestStatus, Verdicts};
