use chrono::Utc;

/// Current unix time in milliseconds, used for deploy timestamps.
pub fn time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_millis_is_monotonic_enough() {
        let a = time_millis();
        let b = time_millis();
        assert!(a > 1_600_000_000_000);
        assert!(b >= a);
    }
}
