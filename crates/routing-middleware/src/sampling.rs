//! Event sampling.
//!
//! Consistent sampling hashes a stable field of the payload so that the same
//! value always lands on the same side of the threshold, here and server-side.

use crate::path;
use crate::stringify::stringify;
use md5::{Digest, Md5};
use rand::Rng;
use serde_json::Value;

/// Keep/drop decision for a `sample_event` transformer.
pub fn sample_event(payload: &Value, percent: f64, field_path: Option<&str>) -> bool {
    if percent <= 0.0 {
        return false;
    }
    if percent >= 1.0 {
        return true;
    }

    match field_path.filter(|p| !p.is_empty()) {
        None => sample_percent(percent),
        Some(field_path) => {
            let field = path::get(payload, field_path).unwrap_or(&Value::Null);
            consistent_value(field) < percent
        }
    }
}

/// Uniform random draw in `[0, 1)`, kept when `draw <= percent`.
pub fn sample_percent(percent: f64) -> bool {
    rand::thread_rng().gen::<f64>() <= percent
}

/// Map a JSON value onto `[0, 1)` using the MD5 digest of its compact encoding.
///
/// The first 8 digest bytes form the significand; leading zero bits are
/// refilled from the last 8 bytes and folded into the exponent.
pub fn consistent_value(field: &Value) -> f64 {
    let encoded = stringify(field);
    let digest = Md5::digest(encoded.as_bytes());

    let mut high = [0u8; 8];
    let mut low = [0u8; 8];
    high.copy_from_slice(&digest[..8]);
    low.copy_from_slice(&digest[8..16]);

    let mut significand = u64::from_be_bytes(high);
    let lower = u64::from_be_bytes(low);
    let mut exponent: i32 = -64;

    let leading_zeros = significand.leading_zeros();
    if leading_zeros != 0 {
        exponent -= leading_zeros as i32;
        significand = significand.checked_shl(leading_zeros).unwrap_or(0)
            | lower.checked_shr(64 - leading_zeros).unwrap_or(0);
    }

    significand |= 1;
    significand as f64 * 2f64.powi(exponent)
}
