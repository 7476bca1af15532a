//! Canonical JSON encoding for deterministic hashing and signing.
//!
//! Every hash and signature input in the system is the canonical JSON form of
//! some structure:
//! - Object keys sorted by byte order, recursively
//! - No insignificant whitespace
//! - Arrays keep their original order
//! - Strings escape only `"`, `\` and control characters
//! - Integral numbers in plain decimal, never exponent form, whatever their
//!   magnitude; other floats in shortest round-trip form
//! - Timestamps rendered by [`Timestamp`](crate::types::Timestamp) as ISO-8601 UTC with `Z`
//!
//! **CRITICAL**: This encoding is FROZEN. Changes break every existing hash
//! and signature, including those verified offline from exported bundles.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest as _, Sha256};
use std::fmt::Write;

use crate::types::Digest;

/// Canonicalize a JSON value.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    emit_value(value, &mut out);
    out
}

/// Convert a serializable value into a JSON value.
///
/// # Panics
///
/// Panics if `value` has no JSON representation (e.g. a map with non-string
/// keys). That is a programmer error, not a property of untrusted input.
pub fn to_json_value<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => panic!("value is not representable as canonical JSON: {e}"),
    }
}

/// Canonical JSON of any serializable value.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> String {
    canonicalize(&to_json_value(value))
}

/// Canonical JSON of a serializable struct with one top-level field removed.
///
/// Used to compute signing input with the `signature` field stripped.
///
/// # Panics
///
/// Panics if `value` does not serialize to a JSON object.
pub fn canonical_json_without<T: Serialize + ?Sized>(value: &T, field: &str) -> String {
    match to_json_value(value) {
        Value::Object(mut map) => {
            map.remove(field);
            canonicalize(&Value::Object(map))
        }
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// SHA-256 of raw bytes.
pub fn compute_bytes_hash(bytes: &[u8]) -> Digest {
    Digest(Sha256::digest(bytes).into())
}

/// SHA-256 of the canonical JSON of a value.
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Digest {
    compute_bytes_hash(canonical_json(value).as_bytes())
}

/// SHA-256 over the concatenated lowercase hex renderings of `parts`.
///
/// This is the `a ‖ b` rule used for combined subject hashes, sealed hashes,
/// and Merkle parents.
pub fn hash_concat(parts: &[&Digest]) -> Digest {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.to_hex().as_bytes());
    }
    Digest(hasher.finalize().into())
}

/// Generate a fresh 32-byte salt from the operating system CSPRNG.
pub fn generate_salt() -> Digest {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Digest(bytes)
}

fn emit_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, out),
        Value::String(s) => emit_string(s, out),
        Value::Array(arr) => emit_array(arr, out),
        Value::Object(obj) => emit_object(obj, out),
    }
}

/// Largest magnitude at which every integral f64 is exactly representable.
const MAX_SAFE_INTEGRAL: f64 = 9_007_199_254_740_992.0;

fn emit_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGRAL {
            // Covers -0.0 as well.
            let _ = write!(out, "{}", f as i64);
        } else if f.fract() == 0.0 {
            // Exact decimal expansion; parses back to the same f64.
            let _ = write!(out, "{f:.0}");
        } else {
            out.push_str(&n.to_string());
        }
    }
}

fn emit_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\u{0020}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn emit_array(arr: &[Value], out: &mut String) {
    out.push('[');
    for (i, item) in arr.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        emit_value(item, out);
    }
    out.push(']');
}

fn emit_object(obj: &Map<String, Value>, out: &mut String) {
    // String ordering is byte ordering of the UTF-8 encoding.
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        emit_string(key, out);
        out.push(':');
        emit_value(&obj[key.as_str()], out);
    }
    out.push('}');
}
