//! Cron round-trip helper backing `ScheduledJob::recompute_next_run` (§3, §8).

use std::str::FromStr;

use chrono::{DateTime, Utc};

pub fn next_occurrence(expr: &str, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let schedule = cron::Schedule::from_str(expr).ok()?;
    schedule.after(&from).next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_cron_same_anchor_is_deterministic() {
        let anchor = DateTime::parse_from_rfc3339("2026-08-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let a = next_occurrence("0 0 9 * * *", anchor);
        let b = next_occurrence("0 0 9 * * *", anchor);
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn invalid_expression_returns_none() {
        assert!(next_occurrence("not a cron", Utc::now()).is_none());
    }
}
