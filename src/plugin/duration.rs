use chrono::TimeDelta;

/// Parse a compact duration such as `1h`, `30m`, `1h30m`, `90s`, `500ms` or `2d`.
///
/// Returns `None` for anything malformed, negative, or zero. A bare number
/// without a unit is rejected.
pub fn parse_duration(input: &str) -> Option<TimeDelta> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    let mut total_ms: i64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let value: i64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
        let unit_ms = match &rest[..unit_len] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return None,
        };
        rest = &rest[unit_len..];

        total_ms = total_ms.checked_add(value.checked_mul(unit_ms)?)?;
    }

    if total_ms == 0 {
        return None;
    }
    TimeDelta::try_milliseconds(total_ms)
}
