//! Clock-driven scheduling for the growth tick.
//!
//! The scheduler runs on system-clock checks aligned to UTC boundaries
//! rather than an OS cron: the daemon loop polls `check_and_run` and the
//! scheduler decides whether the current boundary has already had its
//! tick. Tracking the last fired boundary makes the tick a per-process
//! singleton — polling twice inside one boundary cannot run growth twice,
//! though a tick may freely overlap player actions.

use chrono::{DateTime, Timelike, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::garden::errors::GardenError;
use crate::garden::growth::run_growth_tick;
use crate::garden::storage::GardenStore;
use crate::garden::types::GrowthReport;

/// How often crops grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthFrequency {
    /// Disabled - no automatic growth.
    Disabled,
    /// Every hour at the top of the hour.
    Hourly,
    /// Every 6 hours (0, 6, 12, 18).
    Every6Hours,
    /// Every 12 hours (0, 12).
    Every12Hours,
    /// Once daily at midnight UTC.
    Daily,
}

impl GrowthFrequency {
    /// Get the frequency in minutes (for display purposes).
    pub fn minutes(&self) -> u32 {
        match self {
            GrowthFrequency::Disabled => 0,
            GrowthFrequency::Hourly => 60,
            GrowthFrequency::Every6Hours => 360,
            GrowthFrequency::Every12Hours => 720,
            GrowthFrequency::Daily => 1440,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            GrowthFrequency::Disabled => "Disabled",
            GrowthFrequency::Hourly => "Every hour",
            GrowthFrequency::Every6Hours => "Every 6 hours",
            GrowthFrequency::Every12Hours => "Every 12 hours",
            GrowthFrequency::Daily => "Daily at midnight UTC",
        }
    }

    /// Parse from a string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disabled" | "off" | "none" => Some(GrowthFrequency::Disabled),
            "hourly" | "1h" | "60m" => Some(GrowthFrequency::Hourly),
            "6h" | "6hours" | "every6hours" => Some(GrowthFrequency::Every6Hours),
            "12h" | "12hours" | "every12hours" => Some(GrowthFrequency::Every12Hours),
            "daily" | "1d" | "24h" => Some(GrowthFrequency::Daily),
            _ => None,
        }
    }
}

impl Default for GrowthFrequency {
    fn default() -> Self {
        GrowthFrequency::Daily
    }
}

/// Growth scheduler state tracker.
pub struct GrowthScheduler {
    frequency: GrowthFrequency,
    last_boundary_minute: Option<i64>,
}

impl GrowthScheduler {
    pub fn new(frequency: GrowthFrequency) -> Self {
        Self {
            frequency,
            last_boundary_minute: None,
        }
    }

    pub fn frequency(&self) -> GrowthFrequency {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: GrowthFrequency) {
        self.frequency = frequency;
        info!("growth frequency set to: {}", frequency.description());
    }

    /// The UTC boundary minute `now` falls in, or `None` when `now` is
    /// not on a boundary for the configured frequency.
    fn boundary_minute(&self, now: DateTime<Utc>) -> Option<i64> {
        let interval = self.frequency.minutes();
        if interval == 0 {
            return None;
        }
        let minute_of_day = (now.hour() * 60 + now.minute()) as u32;
        if minute_of_day % interval != 0 {
            return None;
        }
        Some(now.timestamp() / 60)
    }

    /// Run the growth tick if `now` sits on an unfired boundary.
    pub fn check_and_run(
        &mut self,
        store: &GardenStore,
        now: DateTime<Utc>,
    ) -> Result<Option<GrowthReport>, GardenError> {
        let Some(boundary) = self.boundary_minute(now) else {
            return Ok(None);
        };
        if self.last_boundary_minute == Some(boundary) {
            debug!("growth tick already ran in this boundary, skipping");
            return Ok(None);
        }
        self.last_boundary_minute = Some(boundary);
        info!(
            "running scheduled growth tick (frequency: {})",
            self.frequency.description()
        );
        let report = run_growth_tick(store, now)?;
        Ok(Some(report))
    }
}
