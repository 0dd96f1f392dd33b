use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no env {0:?} specified")]
    Missing(&'static str),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub chat_id: i64,
    pub inactivity: Duration,
    pub database_path: String,
    pub scan_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            telegram_token: string_env(&lookup, "TELEGRAM_TOKEN")?,
            chat_id: int_env(&lookup, "TELEGRAM_CHAT")?,
            inactivity: duration_env(&lookup, "DURATION")?,
            database_path: string_env(&lookup, "DATABASE_PATH")?,
            scan_interval: match lookup("SCAN_INTERVAL") {
                Some(v) if !v.trim().is_empty() => parse_setting("SCAN_INTERVAL", &v)?,
                _ => Duration::from_secs(60 * 60),
            },
        })
    }
}

fn string_env(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn int_env(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<i64, ConfigError> {
    let value = string_env(lookup, key)?;
    value.parse().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{value:?}: {e}"),
    })
}

fn duration_env(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Duration, ConfigError> {
    let value = string_env(lookup, key)?;
    parse_setting(key, &value)
}

fn parse_setting(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_duration(value) {
        Ok(d) if d.is_zero() => Err(ConfigError::Invalid {
            key,
            reason: format!("{value:?}: duration must be positive"),
        }),
        Ok(d) => Ok(d),
        Err(reason) => Err(ConfigError::Invalid {
            key,
            reason: format!("{value:?}: {reason}"),
        }),
    }
}

/// Parse a Go-style duration string such as `720h`, `1h30m` or `1.5h`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }
    // Go accepts a sign; a negative span has no `Duration` form.
    let (negative, unsigned) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if unsigned == "0" {
        return Ok(Duration::ZERO);
    }
    if unsigned.is_empty() {
        return Err(format!("invalid duration {s:?}"));
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = unsigned;

    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("expected number at {rest:?}"));
        }
        let number: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("bad number {:?}", &rest[..num_len]))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            "" => return Err(format!("missing unit in duration {s:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {s:?}")),
        };
        rest = &rest[unit_len..];

        total_nanos += number * nanos_per_unit;
    }

    if negative && total_nanos > 0.0 {
        return Err(format!("negative duration {s:?}"));
    }
    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(format!("duration {s:?} out of range"));
    }
    Ok(Duration::from_nanos(total_nanos as u64))
}
