use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use treadle::WorkItem;

/// One index rebuild cycle.
///
/// This is the treadle `WorkItem` that flows through the index pipeline.
/// Every cycle gets a fresh id so the state store never treats a new
/// cycle as already done; the id also names the cycle's state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildJob {
    id: String,
    /// When the cycle was requested.
    pub requested_at: DateTime<Utc>,
    /// What asked for it (`"schedule"`, `"cli"`, ...).
    pub trigger: String,
}

impl RebuildJob {
    #[must_use]
    pub fn new(trigger: impl Into<String>) -> Self {
        let requested_at = Utc::now();
        Self {
            id: format!(
                "rebuild-{}-{}",
                requested_at.format("%Y%m%dT%H%M%S%.3f"),
                uuid::Uuid::new_v4().simple()
            ),
            requested_at,
            trigger: trigger.into(),
        }
    }
}

impl WorkItem for RebuildJob {
    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for RebuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.trigger)
    }
}
