//! Recent-activity filter built from session audit events.

use chrono::{DateTime, Days, NaiveDate, Utc};
use std::collections::HashMap;

/// Audit event type recorded when a user session starts.
pub const SESSION_BEGIN_EVENT: &str = "com.qlik.user-session.begin";

/// Inclusive range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ActivityWindow {
    /// The `days_back` days before `today`, plus `today`.
    #[must_use]
    pub fn last_days(today: NaiveDate, days_back: u32) -> Self {
        let from = today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .unwrap_or(NaiveDate::MIN);
        Self { from, to: today }
    }

    /// Value for the audit `eventTime` query parameter.
    #[must_use]
    pub fn event_time_range(&self) -> String {
        format!(
            "{}T00:00:00Z/{}T23:59:59Z",
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d")
        )
    }

    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }
}

/// Latest session day per user id within a window.
#[derive(Debug, Clone)]
pub struct LastActivity {
    window: ActivityWindow,
    by_user: HashMap<String, NaiveDate>,
    events: usize,
}

impl LastActivity {
    #[must_use]
    pub fn new(window: ActivityWindow) -> Self {
        Self {
            window,
            by_user: HashMap::new(),
            events: 0,
        }
    }

    /// Records one event. Events without a user, with an unparsable time, or
    /// outside the window are ignored.
    pub fn record(&mut self, user_id: Option<&str>, event_time: Option<&str>) {
        let Some(user_id) = user_id.map(str::trim).filter(|u| !u.is_empty()) else {
            return;
        };
        let Some(day) = event_time
            .and_then(|t| DateTime::parse_from_rfc3339(t.trim()).ok())
            .map(|t| t.with_timezone(&Utc).date_naive())
        else {
            return;
        };
        if !self.window.contains(day) {
            return;
        }

        self.by_user
            .entry(user_id.to_string())
            .and_modify(|last| *last = (*last).max(day))
            .or_insert(day);
        self.events += 1;
    }

    #[must_use]
    pub fn last_seen(&self, user_id: &str) -> Option<NaiveDate> {
        self.by_user.get(user_id).copied()
    }

    #[must_use]
    pub fn is_active(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events
    }

    #[must_use]
    pub fn window(&self) -> ActivityWindow {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_range() {
        let window = ActivityWindow::last_days(day(2024, 3, 10), 10);

        assert_eq!(window.from, day(2024, 2, 29));
        assert_eq!(
            window.event_time_range(),
            "2024-02-29T00:00:00Z/2024-03-10T23:59:59Z"
        );
        assert!(window.contains(day(2024, 2, 29)));
        assert!(window.contains(day(2024, 3, 10)));
        assert!(!window.contains(day(2024, 3, 11)));
    }

    #[test]
    fn test_record_keeps_latest_day() {
        let mut activity = LastActivity::new(ActivityWindow::last_days(day(2024, 3, 10), 30));

        activity.record(Some("u1"), Some("2024-03-01T08:00:00.000Z"));
        activity.record(Some("u1"), Some("2024-03-05T23:30:00-02:00"));
        activity.record(Some("u1"), Some("2024-02-20T12:00:00Z"));

        assert_eq!(activity.last_seen("u1"), Some(day(2024, 3, 6)));
        assert_eq!(activity.event_count(), 3);
    }

    #[test]
    fn test_record_ignores_unusable_events() {
        let mut activity = LastActivity::new(ActivityWindow::last_days(day(2024, 3, 10), 30));

        activity.record(None, Some("2024-03-01T08:00:00Z"));
        activity.record(Some(" "), Some("2024-03-01T08:00:00Z"));
        activity.record(Some("u1"), None);
        activity.record(Some("u1"), Some("yesterday"));
        activity.record(Some("u2"), Some("2023-01-01T00:00:00Z"));

        assert_eq!(activity.user_count(), 0);
        assert_eq!(activity.event_count(), 0);
        assert!(!activity.is_active("u2"));
    }
}
