use chrono::{DateTime, Utc};

/// 月度计数器键前缀
const COUNTER_PREFIX: &str = "counter/";

/// 计数器按 UTC 自然月分区的月份标签，例如 `2024-03`
pub fn month_label(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// 生成月度计数器键 `counter/{YYYY-MM}/{owner}`
///
/// 新的月份自然得到新的键，因此不需要显式清零。
pub fn counter_key(now: DateTime<Utc>, owner: &str) -> String {
    format!("{}{}/{}", COUNTER_PREFIX, month_label(now), owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_counter_key_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(counter_key(now, "foo@x.com"), "counter/2024-03/foo@x.com");
    }

    #[test]
    fn test_month_boundary_uses_utc() {
        let last = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(month_label(last), "2023-12");
        assert_eq!(month_label(first), "2024-01");
        assert_ne!(counter_key(last, "a"), counter_key(first, "a"));
    }
}
