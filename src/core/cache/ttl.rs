use std::collections::HashMap;

use chrono::Duration;

use crate::core::error::{InstallerError, InstallerResult};

/// Parse a duration given either as ISO-8601 (`PT12H`, `P2D`, `P1DT6H30M`)
/// or in short form (`45s`, `15m`, `12h`, `2d`, plain seconds).
pub fn parse_duration(raw: &str) -> InstallerResult<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw));
    }

    let upper = trimmed.to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix('P') {
        return parse_iso8601(rest).ok_or_else(|| invalid(raw));
    }

    parse_short(trimmed).ok_or_else(|| invalid(raw))
}

fn parse_iso8601(rest: &str) -> Option<Duration> {
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total = Duration::zero();
    let mut any = false;

    for (value, unit) in components(date_part)? {
        any = true;
        total += match unit {
            'W' => Duration::weeks(value),
            'D' => Duration::days(value),
            _ => return None,
        };
    }
    if let Some(time) = time_part {
        for (value, unit) in components(time)? {
            any = true;
            total += match unit {
                'H' => Duration::hours(value),
                'M' => Duration::minutes(value),
                'S' => Duration::seconds(value),
                _ => return None,
            };
        }
    }

    any.then_some(total)
}

/// Split `2D` / `6H30M` into (number, unit) pairs.
fn components(part: &str) -> Option<Vec<(i64, char)>> {
    let mut out = Vec::new();
    let mut digits = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return None;
            }
            out.push((digits.parse().ok()?, c));
            digits.clear();
        }
    }
    digits.is_empty().then_some(out)
}

fn parse_short(raw: &str) -> Option<Duration> {
    let lower = raw.to_ascii_lowercase();
    let split = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);
    let value: i64 = number.parse().ok()?;

    match unit {
        "" | "s" => Some(Duration::seconds(value)),
        "ms" => Some(Duration::milliseconds(value)),
        "m" => Some(Duration::minutes(value)),
        "h" => Some(Duration::hours(value)),
        "d" => Some(Duration::days(value)),
        _ => None,
    }
}

fn invalid(raw: &str) -> InstallerError {
    InstallerError::InvalidParameter(format!("invalid duration '{}'", raw))
}

/// Default TTL plus per-operation overrides.
#[derive(Debug, Clone)]
pub struct TtlConfig {
    pub default_ttl: Duration,
    pub per_operation: HashMap<String, Duration>,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::days(2),
            per_operation: HashMap::new(),
        }
    }
}

impl TtlConfig {
    pub fn ttl_for(&self, operation: &str) -> Duration {
        self.per_operation
            .get(operation)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Parse `OPERATION=DURATION` overrides.
    pub fn with_overrides<S: AsRef<str>>(mut self, overrides: &[S]) -> InstallerResult<Self> {
        for raw in overrides {
            let raw = raw.as_ref();
            let (operation, duration) = raw.split_once('=').ok_or_else(|| {
                InstallerError::InvalidParameter(format!(
                    "cache TTL override '{}' must be OPERATION=DURATION",
                    raw
                ))
            })?;
            self.per_operation
                .insert(operation.trim().to_string(), parse_duration(duration)?);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso8601_durations() {
        assert_eq!(parse_duration("P2D").unwrap(), Duration::days(2));
        assert_eq!(parse_duration("PT12H").unwrap(), Duration::hours(12));
        assert_eq!(
            parse_duration("p1dt6h30m").unwrap(),
            Duration::days(1) + Duration::hours(6) + Duration::minutes(30)
        );
    }

    #[test]
    fn parses_short_durations() {
        assert_eq!(parse_duration("45s").unwrap(), Duration::seconds(45));
        assert_eq!(parse_duration("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_duration("90").unwrap(), Duration::seconds(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("PT").is_err());
        assert!(parse_duration("12x").is_err());
        assert!(parse_duration("P1H").is_err());
    }

    #[test]
    fn overrides_take_precedence_over_default() {
        let ttl = TtlConfig::default()
            .with_overrides(&["getProjectVersions=PT1H"])
            .unwrap();
        assert_eq!(ttl.ttl_for("getProjectVersions"), Duration::hours(1));
        assert_eq!(ttl.ttl_for("getProject"), Duration::days(2));
        assert!(TtlConfig::default().with_overrides(&["nope"]).is_err());
    }
}
