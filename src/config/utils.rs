use std::time::Duration;

/// Parse a boolean environment value. Accepts the usual spellings.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a duration value like `300ms`, `30s`, `5m`, `1h`, or compounds like
/// `1m30s`. A bare number is read as seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let number: u64 = digits.parse().ok()?;
        digits.clear();

        let unit = match c {
            'h' => Duration::from_secs(3600),
            's' => Duration::from_secs(1),
            'm' => {
                if chars.peek() == Some(&'s') {
                    chars.next();
                    Duration::from_millis(1)
                } else {
                    Duration::from_secs(60)
                }
            }
            _ => return None,
        };

        total += unit * u32::try_from(number).ok()?;
    }

    if !digits.is_empty() {
        // Trailing number without a unit
        return None;
    }

    Some(total)
}
