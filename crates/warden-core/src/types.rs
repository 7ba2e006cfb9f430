use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a goal queue item (`goal-…`).
pub type GoalId = String;

/// Identifier of a goal candidate (`cand-…`).
pub type CandidateId = String;

/// Identifier of a signal snapshot (`snap-…`).
pub type SnapshotId = String;

/// Risk tier shared by candidates, queue items and plan steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a goal is trying to achieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalIntent {
    #[serde(rename = "stabilize")]
    Stabilize,
    #[serde(rename = "cost-optimize")]
    CostOptimize,
    #[serde(rename = "investigate")]
    Investigate,
    #[serde(rename = "recover")]
    Recover,
    #[serde(rename = "custom")]
    Custom,
}

impl GoalIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stabilize => "stabilize",
            Self::CostOptimize => "cost-optimize",
            Self::Investigate => "investigate",
            Self::Recover => "recover",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "stabilize" => Some(Self::Stabilize),
            "cost-optimize" | "cost-optimise" => Some(Self::CostOptimize),
            "investigate" => Some(Self::Investigate),
            "recover" => Some(Self::Recover),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Intents whose plans mutate infrastructure when executed.
    pub fn requires_execution(&self) -> bool {
        matches!(self, Self::Stabilize | Self::Recover | Self::CostOptimize)
    }

    /// Intents whose plans touch the execution-tier scaler.
    pub fn is_scaling(&self) -> bool {
        matches!(self, Self::Stabilize | Self::CostOptimize)
    }
}

impl fmt::Display for GoalIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six signal sources a snapshot is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Metrics,
    Anomalies,
    Failover,
    Cost,
    Memory,
    Policy,
}

impl SignalSource {
    /// Canonical collection order.
    pub const ALL: [SignalSource; 6] = [
        Self::Metrics,
        Self::Anomalies,
        Self::Failover,
        Self::Cost,
        Self::Memory,
        Self::Policy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Anomalies => "anomalies",
            Self::Failover => "failover",
            Self::Cost => "cost",
            Self::Memory => "memory",
            Self::Policy => "policy",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a dispatch or plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    /// The periodic goal driver.
    Scheduler,
    /// A human operator through the CLI or API.
    Operator,
    /// A protocol tool call.
    Tool,
}

impl Initiator {
    /// Scheduler-driven runs count as automatic execution for policy purposes.
    pub fn is_automatic(&self) -> bool {
        matches!(self, Self::Scheduler)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
            Self::Operator => "operator",
            Self::Tool => "tool",
        }
    }
}

/// Execution-tier vCPU sizes the scaler accepts.
pub const VCPU_TIERS: [u32; 4] = [1, 2, 4, 8];

/// Memory paired with each vCPU tier.
pub fn memory_gib_for_vcpu(vcpu: u32) -> u32 {
    vcpu * 2
}

/// Next tier above `current`, if any.
pub fn next_tier_up(current: u32) -> Option<u32> {
    VCPU_TIERS.iter().copied().find(|t| *t > current)
}

/// Next tier below `current`, if any.
pub fn next_tier_down(current: u32) -> Option<u32> {
    VCPU_TIERS.iter().rev().copied().find(|t| *t < current)
}
