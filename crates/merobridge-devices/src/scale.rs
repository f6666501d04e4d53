//! Wire value conversion helpers.

use merobridge_core::StateValue;

/// Convert a raw wire value to user units, truncated to two decimals.
///
/// `exponent` is the power of ten applied to the raw value, e.g. `-3` turns
/// milliwatts into watts.
pub fn scale_value(raw: f64, exponent: i32) -> f64 {
    let scaled = if exponent < 0 {
        raw / 10f64.powi(-exponent)
    } else {
        raw * 10f64.powi(exponent)
    };
    // representation error can land just below an exact cent
    ((scaled * 100.0) + 1e-9).floor() / 100.0
}

/// Convert a user value back to raw wire units.
pub fn unscale_value(value: f64, exponent: i32) -> i64 {
    let raw = if exponent < 0 {
        value * 10f64.powi(-exponent)
    } else {
        value / 10f64.powi(exponent)
    };
    raw.round() as i64
}

/// Format a packed `0xRRGGBB` integer as `#rrggbb`.
pub fn packed_to_hex(packed: u32) -> String {
    format!("#{:06x}", packed & 0x00FF_FFFF)
}

/// Parse `#rrggbb` (or `rrggbb`) into a packed integer.
pub fn hex_to_packed(hex: &str) -> Option<u32> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Parse a user-supplied color.
///
/// Accepts `#rrggbb`, a bare decimal string holding an already packed
/// value, `rrggbb` without the hash, or a number.
pub fn parse_color(value: &StateValue) -> Option<u32> {
    match value {
        StateValue::Number(n) if *n >= 0.0 && *n <= 16_777_215.0 && n.fract() == 0.0 => {
            Some(*n as u32)
        }
        StateValue::Text(s) => {
            let s = s.trim();
            if s.starts_with('#') {
                return hex_to_packed(s);
            }
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                return s.parse::<u32>().ok().filter(|n| *n <= 0x00FF_FFFF);
            }
            hex_to_packed(s)
        }
        _ => None,
    }
}
