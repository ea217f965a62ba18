//! Canonical cache keys for check sub-problems.
//!
//! The fingerprint must be identical across processes and runs, and
//! independent of contextual-tuple and context-map ordering. SHA-256
//! truncated to 64 bits keeps the digest stable regardless of toolchain;
//! the result is rendered as a decimal string.

use sha2::{Digest, Sha256};

use crate::error::{DomainError, DomainResult};

use super::types::ResolveCheckRequest;

/// Namespaces sub-problem keys against other caches sharing storage.
pub const SUBPROBLEM_CACHE_PREFIX: &str = "sc.";

/// Truncates a SHA-256 digest of `bytes` to 64 bits.
fn hash64(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Converts a `ResolveCheckRequest` into a canonical cache key.
///
/// For one store and model, the same tuple key with the same contextual
/// tuples and context produces the same key. Contextual tuple order and
/// context key order are ignored; only the contents are compared.
///
/// # Errors
/// Returns `DomainError::Internal` if a context value cannot be
/// canonicalized.
pub fn check_request_cache_key(req: &ResolveCheckRequest) -> DomainResult<String> {
    let mut hasher = Sha256::new();

    hasher.update(format!(
        "{}{}/{}/{}#{}@{}",
        SUBPROBLEM_CACHE_PREFIX,
        req.store_id,
        req.authorization_model_id,
        req.tuple_key.object,
        req.tuple_key.relation,
        req.tuple_key.user,
    ));

    // avoid hashing the optional parts when they are absent
    if !req.contextual_tuples.is_empty() {
        // commutative fold: XOR of per-tuple digests, plus the multiset
        // count so {A, A} and {A} differ
        let mut acc = 0u64;
        for tuple in req.contextual_tuples.iter() {
            acc ^= hash64(tuple.to_string().as_bytes());
        }
        hasher.update(acc.to_be_bytes());
        hasher.update((req.contextual_tuples.len() as u64).to_be_bytes());
    }

    if !req.context.is_empty() {
        let mut buf = Vec::new();
        let mut entries: Vec<(&String, &serde_json::Value)> = req.context.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in entries {
            write_canonical_str(&mut buf, key);
            write_canonical_value(&mut buf, value)?;
        }
        hasher.update(&buf);
    }

    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    Ok(u64::from_be_bytes(prefix).to_string())
}

fn write_canonical_str(buf: &mut Vec<u8>, value: &str) {
    buf.push(b's');
    buf.extend_from_slice(&(value.len() as u64).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}

/// Feeds a context value into the buffer in canonical form: map keys
/// sorted, array order preserved (array order is semantic), numbers
/// normalized, each value tagged by kind.
fn write_canonical_value(buf: &mut Vec<u8>, value: &serde_json::Value) -> DomainResult<()> {
    match value {
        serde_json::Value::Null => buf.push(b'z'),
        serde_json::Value::Bool(true) => buf.push(b't'),
        serde_json::Value::Bool(false) => buf.push(b'f'),
        serde_json::Value::Number(number) => write_canonical_number(buf, number)?,
        serde_json::Value::String(string) => write_canonical_str(buf, string),
        serde_json::Value::Array(items) => {
            buf.push(b'a');
            buf.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                write_canonical_value(buf, item)?;
            }
        }
        serde_json::Value::Object(map) => {
            buf.push(b'm');
            buf.extend_from_slice(&(map.len() as u64).to_be_bytes());
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in entries {
                write_canonical_str(buf, key);
                write_canonical_value(buf, value)?;
            }
        }
    }
    Ok(())
}

/// Normalizes numbers so observationally equal inputs hash identically:
/// integer-valued floats take the integer form, `-0` collapses to `0`,
/// and remaining floats use their exact IEEE-754 bits.
fn write_canonical_number(buf: &mut Vec<u8>, number: &serde_json::Number) -> DomainResult<()> {
    if let Some(value) = number.as_i64() {
        buf.push(b'i');
        buf.extend_from_slice(&value.to_be_bytes());
        return Ok(());
    }
    if let Some(value) = number.as_u64() {
        buf.push(b'u');
        buf.extend_from_slice(&value.to_be_bytes());
        return Ok(());
    }
    if let Some(value) = number.as_f64() {
        // -0.0 == 0.0, so the first branch also folds negative zero
        if value == 0.0 {
            buf.push(b'i');
            buf.extend_from_slice(&0i64.to_be_bytes());
        } else if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
            buf.push(b'i');
            buf.extend_from_slice(&(value as i64).to_be_bytes());
        } else {
            buf.push(b'd');
            buf.extend_from_slice(&value.to_be_bytes());
        }
        return Ok(());
    }
    Err(DomainError::Internal {
        message: format!("unrepresentable context number: {number}"),
    })
}
