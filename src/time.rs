use chrono::{DateTime, Datelike, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Start of the ISO week (Monday 00:00 UTC) containing `now_ms`.
pub fn start_of_week_ms(now_ms: i64) -> i64 {
    let now = DateTime::<Utc>::from_timestamp_millis(now_ms).unwrap_or(DateTime::UNIX_EPOCH);
    let days_back = now.weekday().num_days_from_monday() as i64;
    let midnight = now
        .date_naive()
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis();
    midnight - days_back * 24 * 60 * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_reasonable() {
        let a = now_ms();
        assert!(a > 1_500_000_000_000); // after 2017
        assert!(a < 4_100_000_000_000); // before year ~2100
    }

    #[test]
    fn week_starts_on_monday() {
        // 2026-08-19 is a Wednesday.
        let wednesday = chrono::NaiveDate::from_ymd_opt(2026, 8, 19)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        let start = start_of_week_ms(wednesday);
        let monday = chrono::NaiveDate::from_ymd_opt(2026, 8, 17)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(start, monday);
    }
}
