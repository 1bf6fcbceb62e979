use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMethod {
    #[default]
    Proximity,
    Balanced,
    Efficiency,
}

impl std::str::FromStr for DispatchMethod {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "proximity" => Ok(Self::Proximity),
            "balanced" => Ok(Self::Balanced),
            "efficiency" => Ok(Self::Efficiency),
            other => Err(format!(
                "unknown dispatch method: {other}, expected proximity/balanced/efficiency"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchSettings {
    /// Read and exposed, but bucket precedence does not depend on it.
    pub prioritize_urgent: bool,
    pub dispatch_method: DispatchMethod,
    pub max_distance_km: f64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            prioritize_urgent: true,
            dispatch_method: DispatchMethod::Proximity,
            max_distance_km: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTrigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub trigger: DispatchTrigger,
    pub attempted: usize,
    pub committed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    Disabled,
    Armed { next_run_at: DateTime<Utc> },
    Running,
}

/// Point-in-time view of the scheduler for hosts and dashboards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleStatus {
    pub state: SchedulerState,
    pub enabled: bool,
    /// Interval ticks actually run at.
    pub interval_seconds: u64,
    /// Stored interval that takes effect on the next enable.
    pub pending_interval_seconds: Option<u64>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub countdown_seconds: Option<i64>,
    pub cumulative_dispatch_count: u64,
    pub missed_cycles: u64,
    pub last_cycle_summary: Option<CycleSummary>,
}
