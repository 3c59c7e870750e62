use log::debug;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::types::{QuotaStatus, QuotaWindow};

pub const DEFAULT_PER_SECOND: u32 = 5;
pub const DEFAULT_PER_MINUTE: u32 = 50;
pub const DEFAULT_PER_HOUR: u32 = 1_000;
pub const DEFAULT_PER_DAY: u32 = 10_000;

/// Response headers carrying the remaining request count of each window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaHeaderNames {
    pub second: HeaderName,
    pub minute: HeaderName,
    pub hour: HeaderName,
    pub day: HeaderName,
}

impl Default for QuotaHeaderNames {
    fn default() -> Self {
        Self {
            second: HeaderName::from_static("second-quota-left"),
            minute: HeaderName::from_static("minute-quota-left"),
            hour: HeaderName::from_static("hour-quota-left"),
            day: HeaderName::from_static("day-quota-left"),
        }
    }
}

impl QuotaHeaderNames {
    pub fn for_window(&self, window: QuotaWindow) -> &HeaderName {
        match window {
            QuotaWindow::Second => &self.second,
            QuotaWindow::Minute => &self.minute,
            QuotaWindow::Hour => &self.hour,
            QuotaWindow::Day => &self.day,
        }
    }
}

/// Parse one quota header. Negative counts clamp to zero; anything that is
/// not an integer is treated as absent.
pub fn parse_quota_header(headers: &HeaderMap, name: &HeaderName) -> Option<u32> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|n| n.clamp(0, i64::from(u32::MAX)) as u32)
}

/// Latest remaining-request counters as reported by the remote service.
///
/// Counters are never incremented or decremented locally: each dimension is
/// either a seed default or the value from the most recent response that
/// carried its header.
#[derive(Debug)]
pub struct QuotaTracker {
    status: RwLock<QuotaStatus>,
    names: QuotaHeaderNames,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub fn new(names: QuotaHeaderNames, clock: Arc<dyn Clock>) -> Self {
        let status = QuotaStatus {
            per_second: DEFAULT_PER_SECOND,
            per_minute: DEFAULT_PER_MINUTE,
            per_hour: DEFAULT_PER_HOUR,
            per_day: DEFAULT_PER_DAY,
            last_updated: clock.now(),
        };
        Self {
            status: RwLock::new(status),
            names,
            clock,
        }
    }

    pub fn current_status(&self) -> QuotaStatus {
        *self.status.read()
    }

    /// Overwrite every counter whose header is present and parseable, keep
    /// the previous value otherwise, then stamp the update time.
    pub fn record_headers(&self, headers: &HeaderMap) -> QuotaStatus {
        let parsed: Vec<(QuotaWindow, Option<u32>)> = QuotaWindow::ALL
            .iter()
            .map(|w| (*w, parse_quota_header(headers, self.names.for_window(*w))))
            .collect();
        let now = self.clock.now();
        let mut status = self.status.write();
        for (window, value) in parsed {
            if let Some(v) = value {
                *status.window_mut(window) = v;
            }
        }
        status.last_updated = now;
        debug!(
            "quota updated: second={} minute={} hour={} day={}",
            status.per_second, status.per_minute, status.per_hour, status.per_day
        );
        *status
    }

    /// True iff every window has at least one request left.
    pub fn can_proceed(&self) -> bool {
        !self.status.read().is_exhausted()
    }
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new(QuotaHeaderNames::default(), Arc::new(SystemClock))
    }
}
