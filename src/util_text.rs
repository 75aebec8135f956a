use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc};

/// Naive timestamp layout written by the log converter, in the source's local offset.
const NAIVE_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// The log converter writes wall-clock time in JST.
pub const DEFAULT_SOURCE_OFFSET_SECS: i32 = 9 * 3600;

pub fn default_source_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_SOURCE_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parse a wire timestamp into epoch milliseconds.
///
/// Accepts a JSON number (already milliseconds), an RFC 3339 string, a naive
/// `YYYY-MM-DD HH:MM:SS` string (read in `offset`), or a decimal string.
/// Anything else is `None`.
pub fn parse_timestamp_ms(value: &serde_json::Value, offset: FixedOffset) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => parse_timestamp_str(s, offset),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str, offset: FixedOffset) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, NAIVE_LAYOUT) {
        return offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.timestamp_millis());
    }
    s.parse::<i64>().ok()
}

/// Value for the `since` query parameter.
///
/// The polling endpoint compares whole seconds with a strict `>`, so the
/// cursor is floored to its second and stepped back one; records sharing the
/// cursor's second still arrive and the dedup set drops the ones already seen.
pub fn format_since(ms: i64, offset: FixedOffset) -> String {
    let floored = ms.div_euclid(1000) * 1000 - 1000;
    match offset.timestamp_millis_opt(floored).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => ms.to_string(),
    }
}

/// Short clock label for list rows, e.g. "14:03:27", in the source's offset.
pub fn format_clock(ms: Option<i64>, offset: FixedOffset) -> String {
    ms.and_then(|ms| offset.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// First non-empty line, clipped to `max_chars` with an ellipsis.
pub fn preview_line(content: &str, max_chars: usize) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let mut out: String = line.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc() -> FixedOffset {
        Utc.fix()
    }

    #[test]
    fn parses_all_wire_shapes() {
        assert_eq!(parse_timestamp_ms(&json!(5), utc()), Some(5));
        assert_eq!(
            parse_timestamp_ms(&json!("1970-01-01T00:00:01Z"), utc()),
            Some(1000)
        );
        assert_eq!(
            parse_timestamp_ms(&json!("1970-01-01 00:00:02"), utc()),
            Some(2000)
        );
        assert_eq!(parse_timestamp_ms(&json!("42"), utc()), Some(42));
        assert_eq!(parse_timestamp_ms(&json!("yesterday"), utc()), None);
        assert_eq!(parse_timestamp_ms(&json!(null), utc()), None);
    }

    #[test]
    fn naive_timestamps_are_read_in_the_source_offset() {
        let jst = default_source_offset();
        let ms = parse_timestamp_ms(&json!("2024-05-01 19:00:00"), jst).unwrap();
        // 19:00 JST is 10:00 UTC
        assert_eq!(
            parse_timestamp_ms(&json!("2024-05-01T10:00:00Z"), utc()),
            Some(ms)
        );
        // explicit offsets win over the source offset
        assert_eq!(
            parse_timestamp_ms(&json!("2024-05-01T19:00:00+09:00"), utc()),
            Some(ms)
        );
    }

    #[test]
    fn since_lands_one_second_before_the_cursor_wall_clock() {
        let jst = default_source_offset();
        let ms = parse_timestamp_ms(&json!("2024-05-01 19:00:00"), jst).unwrap();
        let since = format_since(ms + 250, jst);
        assert_eq!(since, "2024-05-01T18:59:59+09:00");
        // the server turns `since` back into JST wall clock and string-compares
        let back = DateTime::parse_from_rfc3339(&since).unwrap().with_timezone(&jst);
        assert_eq!(back.format(NAIVE_LAYOUT).to_string(), "2024-05-01 18:59:59");
        assert!("2024-05-01 19:00:00" > back.format(NAIVE_LAYOUT).to_string().as_str());
    }

    #[test]
    fn clock_uses_the_source_offset() {
        let jst = default_source_offset();
        let ms = parse_timestamp_ms(&json!("2024-05-01 19:00:05"), jst);
        assert_eq!(format_clock(ms, jst), "19:00:05");
        assert_eq!(format_clock(ms, utc()), "10:00:05");
        assert_eq!(format_clock(None, jst), "--:--:--");
    }

    #[test]
    fn truncation_respects_utf8() {
        // "é" is two bytes; cutting at 1 must not split it
        assert_eq!(truncate_at_char_boundary("éa", 1), "");
        assert_eq!(truncate_at_char_boundary("éa", 2), "é");
        assert_eq!(truncate_at_char_boundary("abc", 10), "abc");
    }

    #[test]
    fn preview_skips_blank_lines() {
        assert_eq!(preview_line("\n\n  hello world \nnext", 40), "hello world");
        assert_eq!(preview_line("abcdef", 4), "abc…");
    }
}
