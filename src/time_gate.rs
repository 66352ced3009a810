use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::config::TimeWindow;

/// Source of the current instant. Swapped out in tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Operating-hours check. Stateless apart from the window it was built with.
pub struct TimeGate {
    window: TimeWindow,
}

impl TimeGate {
    pub fn new(window: &TimeWindow) -> Self {
        TimeGate { window: window.clone() }
    }

    /// True iff `now`, seen in the configured timezone, falls on a permitted
    /// weekday and inside `[start, end)`.
    pub fn is_operable<Z: TimeZone>(&self, now: &DateTime<Z>) -> bool {
        self.closed_reason(now).is_none()
    }

    /// Why the gate is closed at `now`, or `None` when it is open.
    pub fn closed_reason<Z: TimeZone>(&self, now: &DateTime<Z>) -> Option<String> {
        let local = now.with_timezone(&self.window.timezone);
        let weekday = local.weekday();
        if !self.window.days.contains(&weekday) {
            return Some(format!(
                "{} is not an operating day ({} local time)",
                weekday,
                local.format("%Y-%m-%d %H:%M:%S %Z")
            ));
        }

        let time = local.time();
        if time < self.window.start || time >= self.window.end {
            return Some(format!(
                "{} is outside operating hours {} - {} ({})",
                local.format("%H:%M:%S"),
                self.window.start.format("%H:%M"),
                self.window.end.format("%H:%M"),
                self.window.timezone
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_weekdays;
    use chrono::NaiveTime;
    use chrono_tz::America::New_York;
    use chrono_tz::Tz;

    fn office_hours() -> TimeGate {
        let window = TimeWindow::new(
            parse_weekdays("Mon-Fri").unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 30, 0).unwrap(),
            New_York,
        )
        .unwrap();
        TimeGate::new(&window)
    }

    fn ny(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Tz> {
        New_York.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    // 2024-06-12 is a Wednesday, 2024-06-15 a Saturday.
    #[test]
    fn weekday_and_hours_boundaries() {
        let gate = office_hours();
        assert!(!gate.is_operable(&ny(2024, 6, 15, 10, 0, 0)));
        assert!(gate.is_operable(&ny(2024, 6, 12, 9, 0, 0)));
        assert!(!gate.is_operable(&ny(2024, 6, 12, 16, 30, 0)));
        assert!(gate.is_operable(&ny(2024, 6, 12, 16, 29, 59)));
        assert!(!gate.is_operable(&ny(2024, 6, 12, 8, 59, 59)));
    }

    #[test]
    fn evaluates_in_configured_timezone() {
        let gate = office_hours();
        // 14:00 UTC on a Wednesday in June is 10:00 in New York.
        let utc = Utc.with_ymd_and_hms(2024, 6, 12, 14, 0, 0).unwrap();
        assert!(gate.is_operable(&utc));
        // 02:00 UTC Thursday is still Wednesday 22:00 in New York.
        let late = Utc.with_ymd_and_hms(2024, 6, 13, 2, 0, 0).unwrap();
        assert!(!gate.is_operable(&late));
    }

    #[test]
    fn reasons_name_the_cause() {
        let gate = office_hours();
        assert!(gate.closed_reason(&ny(2024, 6, 15, 10, 0, 0)).unwrap().contains("not an operating day"));
        assert!(gate.closed_reason(&ny(2024, 6, 12, 17, 0, 0)).unwrap().contains("outside operating hours"));
        assert!(gate.closed_reason(&ny(2024, 6, 12, 12, 0, 0)).is_none());
    }
}
