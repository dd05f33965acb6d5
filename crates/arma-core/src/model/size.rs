/// Size formatting and parsing: human-readable byte counts.
///
/// All internal sizes are `u64` bytes. Floating point is only used at the
/// formatting and parsing boundary.
///
/// Output uses decimal SI units (`kB` = 1000) because that is what Redis
/// tooling and `INFO memory` print. Input accepts both decimal (`KB`, `MB`)
/// and binary (`KiB`, `MiB`) suffixes.
use thiserror::Error;

const SI_UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Format a byte count into a human-readable string.
///
/// Values are rounded to one decimal; below 10 of a unit one decimal is
/// shown, above it none (`1.5 kB`, `83 MB`).
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < SI_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        return format!("{bytes} B");
    }
    let rounded = (value * 10.0 + 0.5).floor() / 10.0;
    if rounded < 10.0 {
        format!("{rounded:.1} {}", SI_UNITS[unit])
    } else {
        format!("{rounded:.0} {}", SI_UNITS[unit])
    }
}

/// Format a key count with thousand separators.
pub fn format_count(count: u64) -> String {
    if count < 1_000 {
        return count.to_string();
    }
    let s = count.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseSizeError {
    #[error("empty size")]
    Empty,
    #[error("invalid number in size {0:?}")]
    InvalidNumber(String),
    #[error("unknown size unit {0:?}")]
    UnknownUnit(String),
    #[error("size {0:?} does not fit in 64 bits")]
    Overflow(String),
}

/// Parse a human-readable size such as `1KB`, `1.5 MiB`, `42`, or `2gb`.
///
/// Units are case-insensitive. A bare number is bytes.
pub fn parse_size(input: &str) -> Result<u64, ParseSizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseSizeError::Empty);
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| ParseSizeError::InvalidNumber(input.to_string()))?;
    let multiplier =
        unit_multiplier(unit.trim()).ok_or_else(|| ParseSizeError::UnknownUnit(unit.trim().to_string()))?;

    let bytes = number * multiplier;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(ParseSizeError::Overflow(input.to_string()));
    }
    Ok(bytes.round() as u64)
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    const K: f64 = 1000.0;
    const KI: f64 = 1024.0;
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "b" | "byte" | "bytes" => 1.0,
        "k" | "kb" => K,
        "ki" | "kib" => KI,
        "m" | "mb" => K.powi(2),
        "mi" | "mib" => KI.powi(2),
        "g" | "gb" => K.powi(3),
        "gi" | "gib" => KI.powi(3),
        "t" | "tb" => K.powi(4),
        "ti" | "tib" => KI.powi(4),
        "p" | "pb" => K.powi(5),
        "pi" | "pib" => KI.powi(5),
        "e" | "eb" => K.powi(6),
        "ei" | "eib" => KI.powi(6),
        _ => return None,
    };
    Some(multiplier)
}
