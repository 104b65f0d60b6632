use std::time::Duration;

use super::types::{PositiveU64, PositiveUsize};
use crate::error::{AppError, AppResult, ValidationError};

pub(crate) fn parse_header(s: &str) -> Result<(String, String), ValidationError> {
    let Some((key, value)) = s.split_once(':') else {
        return Err(ValidationError::InvalidHeaderFormat {
            value: s.to_owned(),
        });
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(ValidationError::HeaderNameEmpty {
            value: s.to_owned(),
        });
    }
    Ok((key.to_owned(), value.trim().to_owned()))
}

pub(super) fn parse_positive_u64(s: &str) -> AppResult<PositiveU64> {
    s.parse::<PositiveU64>().map_err(AppError::from)
}

pub(super) fn parse_positive_usize(s: &str) -> AppResult<PositiveUsize> {
    s.parse::<PositiveUsize>().map_err(AppError::from)
}

/// Parses `250ms`, `30s`, `2m`, `1h` or a bare number of seconds.
pub(crate) fn parse_duration_arg(s: &str) -> AppResult<Duration> {
    parse_duration_value(s).map_err(AppError::validation)
}

pub(crate) fn parse_duration_value(s: &str) -> Result<Duration, ValidationError> {
    let value = s.trim();
    if value.is_empty() {
        return Err(ValidationError::DurationEmpty);
    }

    let digits_len = value.chars().take_while(char::is_ascii_digit).count();
    if digits_len == 0 {
        return Err(ValidationError::InvalidDurationFormat {
            value: value.to_owned(),
        });
    }
    let (num_part, unit_part) = value.split_at(digits_len);
    let number: u64 = num_part
        .parse()
        .map_err(|err| ValidationError::InvalidDurationNumber {
            value: value.to_owned(),
            source: err,
        })?;

    let seconds_per_unit: u64 = match unit_part.trim() {
        "ms" => return non_zero(Duration::from_millis(number)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        unit => {
            return Err(ValidationError::InvalidDurationUnit {
                unit: unit.to_owned(),
            });
        }
    };
    let secs = number
        .checked_mul(seconds_per_unit)
        .ok_or(ValidationError::DurationOverflow)?;
    non_zero(Duration::from_secs(secs))
}

const fn non_zero(duration: Duration) -> Result<Duration, ValidationError> {
    if duration.is_zero() {
        Err(ValidationError::DurationZero)
    } else {
        Ok(duration)
    }
}
