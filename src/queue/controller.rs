//! Iteration controller
//!
//! The queue holds `(test, result)` pairs in execution order. Finished entries
//! stay in place; retries and further iterations are inserted as fresh
//! entries directly after the entry that spawned them, so the queue doubles as
//! the run history.

use std::collections::VecDeque;

use crate::suite::TestCase;

use super::result::{TestOutcome, TestResult, TestStatus};

/// Maximum executions of one test iteration (first run + retries)
pub const MAX_ATTEMPTS: u32 = 3;

/// A queued test and its result
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub test: TestCase,
    pub result: TestResult,
}

/// Counts of entries per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub retried: usize,
    pub pending: usize,
}

impl QueueSummary {
    /// No final result failed
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.pending == 0
    }
}

/// What `complete` queued after an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    Retry { attempt: u32 },
    Iteration { iteration: u32 },
}

/// Deque-based test queue with retry and iteration support
#[derive(Debug)]
pub struct IterationController {
    entries: VecDeque<QueueEntry>,
    cursor: usize,
    iterate: u32,
}

impl IterationController {
    /// Create a controller; `iterate` is the number of iterations per test
    pub fn new(tests: Vec<TestCase>, iterate: Option<u32>) -> Self {
        let entries = tests
            .into_iter()
            .map(|test| QueueEntry {
                test,
                result: TestResult::default(),
            })
            .collect();
        Self {
            entries,
            cursor: 0,
            iterate: iterate.unwrap_or(1).max(1),
        }
    }

    pub fn iterate(&self) -> u32 {
        self.iterate
    }

    /// Claim the next pending entry, marking it running
    pub fn next_pending(&mut self) -> Option<usize> {
        while self.cursor < self.entries.len() {
            let index = self.cursor;
            self.cursor += 1;
            let entry = &mut self.entries[index];
            if entry.result.status == TestStatus::Pending {
                entry.result.status = TestStatus::Running;
                entry.result.attempts = entry.test.attempt;
                return Some(index);
            }
        }
        None
    }

    pub fn entry(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut QueueEntry> {
        self.entries.get_mut(index)
    }

    /// Record the outcome of a running entry and queue any follow-up run
    pub fn complete(&mut self, index: usize, outcome: TestOutcome) -> FollowUp {
        self.record(index, outcome, true)
    }

    /// Record the outcome without queueing a retry
    ///
    /// Used when the entries after this one are about to be skipped (a frozen
    /// block, an interrupted run): a failure stays FAILED instead of handing
    /// its verdict to a retry that never runs.
    pub fn complete_final(&mut self, index: usize, outcome: TestOutcome) -> FollowUp {
        self.record(index, outcome, false)
    }

    fn record(&mut self, index: usize, outcome: TestOutcome, allow_retry: bool) -> FollowUp {
        let Some(entry) = self.entries.get_mut(index) else {
            return FollowUp::None;
        };
        entry.result.record(outcome);

        let test = &entry.test;
        let failed = entry.result.status == TestStatus::Failed;

        let follow_up = if failed
            && allow_retry
            && test.flags.retry_on_failure
            && test.attempt < MAX_ATTEMPTS
        {
            entry.result.status = TestStatus::Retry;
            FollowUp::Retry {
                attempt: test.attempt + 1,
            }
        } else if test.iteration < self.iterate {
            FollowUp::Iteration {
                iteration: test.iteration + 1,
            }
        } else {
            FollowUp::None
        };

        let next = match follow_up {
            FollowUp::Retry { attempt } => Some(test.next_run(test.iteration, attempt)),
            FollowUp::Iteration { iteration } => Some(test.next_run(iteration, 1)),
            FollowUp::None => None,
        };

        if let Some(test) = next {
            tracing::debug!("Queueing {} after entry {}", test.label(), index);
            self.entries.insert(
                index + 1,
                QueueEntry {
                    test,
                    result: TestResult::default(),
                },
            );
        }

        follow_up
    }

    /// Skip every pending entry of `block`; returns how many were skipped
    pub fn skip_block(&mut self, block: &str, reason: &str) -> usize {
        let mut skipped = 0;
        for entry in self.entries.iter_mut().skip(self.cursor) {
            if entry.test.block == block && entry.result.status == TestStatus::Pending {
                entry.result.status = TestStatus::Skipped;
                entry.result.error = Some(reason.to_string());
                skipped += 1;
            }
        }
        skipped
    }

    /// Skip every pending entry, e.g. when the run is interrupted
    pub fn skip_pending(&mut self, reason: &str) -> usize {
        let mut skipped = 0;
        for entry in self.entries.iter_mut() {
            if entry.result.status == TestStatus::Pending {
                entry.result.status = TestStatus::Skipped;
                entry.result.error = Some(reason.to_string());
                skipped += 1;
            }
        }
        skipped
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<QueueEntry> {
        self.entries.into()
    }

    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            match entry.result.status {
                TestStatus::Completed => summary.completed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Skipped => summary.skipped += 1,
                TestStatus::Retry => summary.retried += 1,
                TestStatus::Pending | TestStatus::Running => summary.pending += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{TestFlags, TestKind};
    use chrono::Local;
    use std::collections::BTreeMap;

    fn test_case(name: &str, block: &str, retry: bool) -> TestCase {
        TestCase {
            name: name.to_string(),
            kind: TestKind::Launch,
            block: block.to_string(),
            description: None,
            script: None,
            timeout_secs: None,
            app_args: Vec::new(),
            env: BTreeMap::new(),
            flags: TestFlags {
                retry_on_failure: retry,
                ..TestFlags::default()
            },
            iteration: 1,
            attempt: 1,
            paths: None,
        }
    }

    fn outcome(passed: bool) -> TestOutcome {
        let mut outcome = TestOutcome::failed("failed", Local::now());
        outcome.passed = passed;
        if passed {
            outcome.error = None;
        }
        outcome
    }

    fn run_all(controller: &mut IterationController, mut verdict: impl FnMut(&TestCase) -> bool) {
        while let Some(index) = controller.next_pending() {
            let passed = verdict(&controller.entry(index).unwrap().test);
            controller.complete(index, outcome(passed));
        }
    }

    fn order(controller: &IterationController) -> Vec<(String, u32, u32, TestStatus)> {
        controller
            .entries()
            .map(|e| {
                (
                    e.test.name.clone(),
                    e.test.iteration,
                    e.test.attempt,
                    e.result.status,
                )
            })
            .collect()
    }

    #[test]
    fn test_passing_tests_run_once_in_order() {
        let mut controller = IterationController::new(
            vec![test_case("a", "a", true), test_case("b", "b", true)],
            None,
        );
        run_all(&mut controller, |_| true);

        assert_eq!(
            order(&controller),
            vec![
                ("a".to_string(), 1, 1, TestStatus::Completed),
                ("b".to_string(), 1, 1, TestStatus::Completed),
            ]
        );
        assert!(controller.summary().all_passed());
    }

    #[test]
    fn test_failing_test_retried_up_to_cap() {
        let mut controller = IterationController::new(
            vec![test_case("a", "a", true), test_case("b", "b", true)],
            None,
        );
        run_all(&mut controller, |t| t.name != "a");

        assert_eq!(
            order(&controller),
            vec![
                ("a".to_string(), 1, 1, TestStatus::Retry),
                ("a".to_string(), 1, 2, TestStatus::Retry),
                ("a".to_string(), 1, 3, TestStatus::Failed),
                ("b".to_string(), 1, 1, TestStatus::Completed),
            ]
        );
        let summary = controller.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retried, 2);
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_retry_succeeds_on_second_attempt() {
        let mut controller = IterationController::new(vec![test_case("a", "a", true)], None);
        run_all(&mut controller, |t| t.attempt == 2);

        assert_eq!(
            order(&controller),
            vec![
                ("a".to_string(), 1, 1, TestStatus::Retry),
                ("a".to_string(), 1, 2, TestStatus::Completed),
            ]
        );
        assert!(controller.summary().all_passed());
        assert_eq!(controller.entry(1).unwrap().result.attempts, 2);
    }

    #[test]
    fn test_no_retry_when_flag_disabled() {
        let mut controller = IterationController::new(vec![test_case("a", "a", false)], None);
        run_all(&mut controller, |_| false);
        assert_eq!(
            order(&controller),
            vec![("a".to_string(), 1, 1, TestStatus::Failed)]
        );
    }

    #[test]
    fn test_iterate_runs_each_test_n_times_back_to_back() {
        let mut controller = IterationController::new(
            vec![test_case("a", "a", false), test_case("b", "b", false)],
            Some(3),
        );
        run_all(&mut controller, |_| true);

        let names: Vec<(String, u32)> = controller
            .entries()
            .map(|e| (e.test.name.clone(), e.test.iteration))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), 1),
                ("a".to_string(), 2),
                ("a".to_string(), 3),
                ("b".to_string(), 1),
                ("b".to_string(), 2),
                ("b".to_string(), 3),
            ]
        );
    }

    #[test]
    fn test_iteration_continues_after_exhausted_retries() {
        let mut controller = IterationController::new(vec![test_case("a", "a", true)], Some(2));
        run_all(&mut controller, |t| t.iteration == 2);

        let statuses: Vec<(u32, u32, TestStatus)> = controller
            .entries()
            .map(|e| (e.test.iteration, e.test.attempt, e.result.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (1, 1, TestStatus::Retry),
                (1, 2, TestStatus::Retry),
                (1, 3, TestStatus::Failed),
                (2, 1, TestStatus::Completed),
            ]
        );
    }

    #[test]
    fn test_skip_block_only_touches_pending_entries_of_block() {
        let mut controller = IterationController::new(
            vec![
                test_case("a", "stage", false),
                test_case("b", "stage", false),
                test_case("c", "other", false),
                test_case("d", "stage", false),
            ],
            None,
        );

        let first = controller.next_pending().unwrap();
        controller.complete(first, outcome(false));
        let skipped = controller.skip_block("stage", "application froze");
        assert_eq!(skipped, 2);

        run_all(&mut controller, |_| true);
        assert_eq!(
            order(&controller)
                .into_iter()
                .map(|(name, _, _, status)| (name, status))
                .collect::<Vec<_>>(),
            vec![
                ("a".to_string(), TestStatus::Failed),
                ("b".to_string(), TestStatus::Skipped),
                ("c".to_string(), TestStatus::Completed),
                ("d".to_string(), TestStatus::Skipped),
            ]
        );
        assert_eq!(
            controller.entry(1).unwrap().result.error.as_deref(),
            Some("application froze")
        );
    }

    #[test]
    fn test_skip_pending_stops_the_run() {
        let mut controller = IterationController::new(
            vec![test_case("a", "a", true), test_case("b", "b", true)],
            Some(2),
        );
        let first = controller.next_pending().unwrap();
        controller.complete(first, outcome(true));

        // The second iteration of `a` and test `b` are still queued
        assert_eq!(controller.skip_pending("interrupted"), 2);
        assert_eq!(controller.next_pending(), None);
        let summary = controller.summary();
        assert_eq!(summary.skipped, 2);
        assert!(summary.all_passed());
    }

    #[test]
    fn test_frozen_failure_with_skipped_block_stays_failed() {
        let mut controller = IterationController::new(
            vec![test_case("a", "blk", true), test_case("b", "blk", true)],
            None,
        );
        let first = controller.next_pending().unwrap();
        let mut frozen = outcome(false);
        frozen.froze = true;
        assert_eq!(controller.complete_final(first, frozen), FollowUp::None);
        assert_eq!(controller.skip_block("blk", "application froze"), 1);

        assert_eq!(
            order(&controller),
            vec![
                ("a".to_string(), 1, 1, TestStatus::Failed),
                ("b".to_string(), 1, 1, TestStatus::Skipped),
            ]
        );
        let summary = controller.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retried, 0);
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_complete_final_still_queues_next_iteration() {
        let mut controller = IterationController::new(vec![test_case("a", "a", true)], Some(2));
        let first = controller.next_pending().unwrap();
        assert_eq!(
            controller.complete_final(first, outcome(false)),
            FollowUp::Iteration { iteration: 2 }
        );
        assert_eq!(controller.skip_pending("interrupted"), 1);
        assert_eq!(
            order(&controller),
            vec![
                ("a".to_string(), 1, 1, TestStatus::Failed),
                ("a".to_string(), 2, 1, TestStatus::Skipped),
            ]
        );
    }
}
