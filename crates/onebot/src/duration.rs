/// Format whole seconds as a compact `1d2h3m4s` string.
///
/// Zero-valued units other than seconds are omitted, so `0` formats as `0s`
/// and `3600` as `1h0s`. Negative input is treated as zero.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let units = [
        (secs / 86_400, "d"),
        (secs % 86_400 / 3_600, "h"),
        (secs % 3_600 / 60, "m"),
    ];

    let mut out = String::new();
    for (value, suffix) in units {
        if value > 0 {
            out.push_str(&value.to_string());
            out.push_str(suffix);
        }
    }
    out.push_str(&format!("{}s", secs % 60));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(65), "1m5s");
        assert_eq!(format_duration(3600), "1h0s");
        assert_eq!(format_duration(90061), "1d1h1m1s");
        assert_eq!(format_duration(-30), "0s");
    }
}
