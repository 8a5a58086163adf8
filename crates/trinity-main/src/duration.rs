use std::time::Duration;

/// Parse `<n>s`, `<n>m`, `<n>h` or `<n>d`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    let Some(unit) = trimmed.chars().last() else {
        return Err("duration cannot be empty".to_string());
    };
    let seconds_per_unit = match unit.to_ascii_lowercase() {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => {
            return Err(format!(
                "invalid duration '{trimmed}': expected <n>s, <n>m, <n>h or <n>d"
            ))
        }
    };
    let amount: u64 = trimmed[..trimmed.len() - unit.len_utf8()]
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{trimmed}': amount must be a whole number"))?;
    amount
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{trimmed}' is too large"))
}
