//! Stage budgets, per-wait policies and the coarse retry schedule.

use std::time::Duration;

use action_primitives::{SettlePolicy, StabilizingWaiter, WaitPolicy};
use dashprobe_core_types::QueryStage;
use serde::{Deserialize, Serialize};

/// Longest pause between coarse attempts.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Deadline of each orchestrator stage, in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageBudgets {
    /// Login plus storage-state application.
    pub session_ms: u64,
    /// Navigation, settling and the expiry check.
    pub navigation_ms: u64,
    pub frame_ms: u64,
    pub parameters_ms: u64,
    pub range_ms: u64,
    pub table_ms: u64,
    pub extract_ms: u64,
}

impl Default for StageBudgets {
    fn default() -> Self {
        Self {
            session_ms: 120_000,
            navigation_ms: 60_000,
            frame_ms: 40_000,
            parameters_ms: 30_000,
            range_ms: 30_000,
            table_ms: 40_000,
            extract_ms: 40_000,
        }
    }
}

impl StageBudgets {
    pub fn budget_ms(&self, stage: QueryStage) -> u64 {
        match stage {
            QueryStage::NotStarted | QueryStage::SessionEnsured => self.session_ms,
            QueryStage::FrameReady => self.frame_ms,
            QueryStage::ParametersSet => self.parameters_ms,
            QueryStage::RangeSet => self.range_ms,
            QueryStage::TableReady => self.table_ms,
            QueryStage::Extracted => self.extract_ms,
        }
    }

    pub fn budget(&self, stage: QueryStage) -> Duration {
        Duration::from_millis(self.budget_ms(stage))
    }

    /// Worst case for a single pass through every stage.
    pub fn total_ms(&self) -> u64 {
        [
            self.session_ms,
            self.navigation_ms,
            self.frame_ms,
            self.parameters_ms,
            self.range_ms,
            self.table_ms,
            self.extract_ms,
        ]
        .iter()
        .sum()
    }
}

/// Polling policy of every wait inside the stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitPolicies {
    pub frame: WaitPolicy,
    pub field: WaitPolicy,
    pub range: WaitPolicy,
    pub table: WaitPolicy,
}

impl Default for WaitPolicies {
    fn default() -> Self {
        Self {
            frame: WaitPolicy::fixed(Duration::from_secs(1), Duration::from_secs(30)),
            field: WaitPolicy::fixed(Duration::from_millis(500), Duration::from_secs(10)),
            range: WaitPolicy::fixed(Duration::from_millis(500), Duration::from_secs(10)),
            table: WaitPolicy::fixed(Duration::from_secs(1), Duration::from_secs(30)),
        }
    }
}

impl WaitPolicies {
    pub fn waiter(&self, stage: QueryStage) -> StabilizingWaiter {
        let policy = match stage {
            QueryStage::FrameReady => &self.frame,
            QueryStage::ParametersSet => &self.field,
            QueryStage::RangeSet => &self.range,
            // Extraction re-reads the table until two reads agree.
            QueryStage::TableReady
            | QueryStage::Extracted
            | QueryStage::NotStarted
            | QueryStage::SessionEnsured => &self.table,
        };
        StabilizingWaiter::new(policy.clone())
    }
}

/// Everything that bounds one orchestrated query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowPolicy {
    pub stages: StageBudgets,
    pub waits: WaitPolicies,
    pub settle: SettlePolicy,
    /// Coarse attempts per query, the first one included.
    pub max_attempts: u32,
    /// First pause between coarse attempts; doubles each time.
    pub backoff_ms: u64,
    /// Navigation timeout handed to the page.
    pub navigation_timeout_ms: u64,
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self {
            stages: StageBudgets::default(),
            waits: WaitPolicies::default(),
            settle: SettlePolicy::default(),
            max_attempts: 3,
            backoff_ms: 1_000,
            navigation_timeout_ms: 30_000,
        }
    }
}

impl FlowPolicy {
    /// Exponential backoff after `attempt` failed: `backoff_ms * 2^(attempt-1)`,
    /// capped at [`MAX_BACKOFF_MS`].
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let total_ms = self.backoff_ms.saturating_mul(multiplier);
        Duration::from_millis(total_ms.min(MAX_BACKOFF_MS))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Problems that make the policy unusable, one line each.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_attempts == 0 {
            problems.push("max_attempts must be at least 1".to_string());
        }
        let nested = [
            (QueryStage::FrameReady, &self.waits.frame),
            (QueryStage::ParametersSet, &self.waits.field),
            (QueryStage::RangeSet, &self.waits.range),
            (QueryStage::TableReady, &self.waits.table),
            (QueryStage::Extracted, &self.waits.table),
        ];
        for (stage, wait) in nested {
            if wait.max_attempts == Some(0) {
                problems.push(format!("{stage} wait allows zero attempts"));
            }
            if !wait.backoff.is_finite() || wait.backoff < 1.0 {
                problems.push(format!("{stage} wait backoff {} must be a finite factor >= 1.0", wait.backoff));
            }
            let budget = self.stages.budget_ms(stage);
            if budget < wait.timeout_ms {
                problems.push(format!(
                    "{stage} budget {budget}ms is shorter than its wait ceiling {}ms",
                    wait.timeout_ms
                ));
            }
        }
        if self.stages.navigation_ms < self.navigation_timeout_ms {
            problems.push(format!(
                "navigation budget {}ms is shorter than the navigation timeout {}ms",
                self.stages.navigation_ms, self.navigation_timeout_ms
            ));
        }
        problems
    }
}
