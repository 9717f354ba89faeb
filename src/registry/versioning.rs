//! # Version Strings
//!
//! Definition versions are free-form strings. Bumping one increments its
//! trailing digit run and keeps everything before it:
//!
//! | current   | next       |
//! |-----------|------------|
//! | `1`       | `2`        |
//! | `v3`      | `v4`       |
//! | `v09`     | `v10`      |
//! | `1.0.9`   | `1.0.10`   |
//! | `beta`    | `beta1`    |
//! | `-5`      | `-6`       |
//!
//! A leading sign is part of the prefix, so `-5` moves away from zero like
//! any other `prefix-N` version.

use std::cmp::Ordering;

/// Split a version into its non-numeric prefix and trailing digit run
pub fn split_version(version: &str) -> (&str, &str) {
    let digits_start = version
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(index, _)| index)
        .unwrap_or(version.len());
    version.split_at(digits_start)
}

/// Compute the version that follows `current`
pub fn next_version(current: &str) -> String {
    let (prefix, digits) = split_version(current);
    if digits.is_empty() {
        return format!("{current}1");
    }
    format!("{prefix}{}", increment_digits(digits))
}

/// Decimal increment on a digit string, keeping its zero padding
fn increment_digits(digits: &str) -> String {
    let mut bytes: Vec<u8> = digits.bytes().collect();
    for byte in bytes.iter_mut().rev() {
        if *byte == b'9' {
            *byte = b'0';
        } else {
            *byte += 1;
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    format!("1{}", String::from_utf8_lossy(&bytes))
}

/// Order versions by prefix, then numerically by their trailing digits
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_prefix, a_digits) = split_version(a);
    let (b_prefix, b_digits) = split_version(b);

    a_prefix
        .cmp(b_prefix)
        .then_with(|| compare_digit_runs(a_digits, b_digits))
        .then_with(|| a.cmp(b))
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
