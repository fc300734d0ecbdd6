//! Quiet-hours and business-hours delivery windows.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

/// A wall-clock window within a single day, e.g. `09:00`-`18:00`.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            // Window wraps past midnight, e.g. 22:00-06:00.
            t >= self.start || t < self.end
        }
    }
}

/// Per-tenant notification delivery schedule.
#[derive(Debug, Clone)]
pub struct NotificationSchedule {
    pub timezone: Tz,
    pub business_hours: Option<TimeWindow>,
    /// Days of week (0 = Sunday .. 6 = Saturday) business hours apply to.
    pub business_days: Vec<u8>,
    pub quiet_hours: Option<TimeWindow>,
    /// Critical alerts bypass quiet hours (but not business-hours
    /// restriction) when set.
    pub except_critical: bool,
    /// Quiet hours apply all day on weekends regardless of the configured
    /// window.
    pub quiet_weekend_all_day: bool,
}

impl Default for NotificationSchedule {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            business_hours: None,
            business_days: vec![1, 2, 3, 4, 5],
            quiet_hours: None,
            except_critical: true,
            quiet_weekend_all_day: false,
        }
    }
}

impl NotificationSchedule {
    fn is_weekend(weekday: chrono::Weekday) -> bool {
        matches!(weekday, chrono::Weekday::Sat | chrono::Weekday::Sun)
    }

    /// Whether a notification may be delivered right now.
    #[must_use]
    pub fn should_notify_now(&self, now: DateTime<Utc>, is_critical: bool) -> bool {
        if is_critical && self.except_critical {
            return true;
        }

        let local = now.with_timezone(&self.timezone);
        let weekday = local.weekday();

        if self.quiet_weekend_all_day && Self::is_weekend(weekday) {
            return false;
        }

        if let Some(quiet) = self.quiet_hours {
            if quiet.contains(local.time()) {
                return false;
            }
        }

        if let Some(business) = self.business_hours {
            let weekday_num = weekday.num_days_from_sunday() as u8;
            let within_business_day = self.business_days.contains(&weekday_num);
            if !within_business_day || !business.contains(local.time()) {
                return false;
            }
        }

        true
    }

    /// The next instant at which delivery would be allowed, scanning
    /// forward in 15-minute increments up to 8 days — enough to clear a
    /// full week of quiet/business-hours restrictions.
    #[must_use]
    pub fn next_notification_window(&self, now: DateTime<Utc>, is_critical: bool) -> DateTime<Utc> {
        if self.should_notify_now(now, is_critical) {
            return now;
        }
        let mut candidate = now;
        let step = ChronoDuration::minutes(15);
        for _ in 0..(8 * 24 * 4) {
            candidate += step;
            if self.should_notify_now(candidate, is_critical) {
                return candidate;
            }
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(start_h: u32, end_h: u32) -> TimeWindow {
        TimeWindow {
            start: NaiveTime::from_hms_opt(start_h, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end_h, 0, 0).unwrap(),
        }
    }

    #[test]
    fn critical_bypasses_quiet_hours_when_except_critical_set() {
        let schedule = NotificationSchedule {
            quiet_hours: Some(window(22, 6)),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 23, 0, 0).unwrap();
        assert!(schedule.should_notify_now(now, true));
    }

    #[test]
    fn non_critical_denied_during_quiet_hours() {
        let schedule = NotificationSchedule {
            quiet_hours: Some(window(22, 6)),
            except_critical: true,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 23, 0, 0).unwrap();
        assert!(!schedule.should_notify_now(now, false));
    }

    #[test]
    fn outside_business_hours_is_denied() {
        let schedule = NotificationSchedule {
            business_hours: Some(window(9, 18)),
            except_critical: false,
            ..Default::default()
        };
        // 2026-07-27 is a Monday.
        let evening = Utc.with_ymd_and_hms(2026, 7, 27, 20, 0, 0).unwrap();
        assert!(!schedule.should_notify_now(evening, false));

        let midday = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        assert!(schedule.should_notify_now(midday, false));
    }

    #[test]
    fn weekend_all_day_quiet_denies_even_during_business_window() {
        let schedule = NotificationSchedule {
            business_hours: Some(window(9, 18)),
            quiet_weekend_all_day: true,
            except_critical: false,
            ..Default::default()
        };
        // 2026-08-01 is a Saturday.
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        assert!(!schedule.should_notify_now(now, false));
    }

    #[test]
    fn next_window_returns_now_when_already_allowed() {
        let schedule = NotificationSchedule::default();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        assert_eq!(schedule.next_notification_window(now, false), now);
    }

    #[test]
    fn next_window_advances_past_quiet_hours() {
        let schedule = NotificationSchedule {
            quiet_hours: Some(window(22, 6)),
            except_critical: false,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 23, 0, 0).unwrap();
        let next = schedule.next_notification_window(now, false);
        assert!(schedule.should_notify_now(next, false));
        assert!(next > now);
    }
}
