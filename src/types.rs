use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Canonical quota snapshot shared by the engine, the session and error values.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub per_second: u32,
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QuotaWindow {
    Second,
    Minute,
    Hour,
    Day,
}

impl QuotaWindow {
    pub const ALL: [QuotaWindow; 4] = [
        QuotaWindow::Second,
        QuotaWindow::Minute,
        QuotaWindow::Hour,
        QuotaWindow::Day,
    ];
}

impl QuotaStatus {
    pub fn window(&self, window: QuotaWindow) -> u32 {
        match window {
            QuotaWindow::Second => self.per_second,
            QuotaWindow::Minute => self.per_minute,
            QuotaWindow::Hour => self.per_hour,
            QuotaWindow::Day => self.per_day,
        }
    }

    pub(crate) fn window_mut(&mut self, window: QuotaWindow) -> &mut u32 {
        match window {
            QuotaWindow::Second => &mut self.per_second,
            QuotaWindow::Minute => &mut self.per_minute,
            QuotaWindow::Hour => &mut self.per_hour,
            QuotaWindow::Day => &mut self.per_day,
        }
    }

    /// True when any window has no requests left.
    pub fn is_exhausted(&self) -> bool {
        QuotaWindow::ALL.iter().any(|w| self.window(*w) == 0)
    }
}
