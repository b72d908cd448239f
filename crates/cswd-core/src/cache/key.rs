use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Identity of one cache entry: the operation and a digest of its arguments.
///
/// Arguments are converted to a JSON value and written with every object's
/// keys sorted, so field order never changes the digest, whatever map type
/// backs `serde_json::Value`. Optional arguments serialize as `null` whether
/// defaulted or given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: String,
    digest: String,
}

impl CacheKey {
    pub fn new<A: Serialize + ?Sized>(operation: &str, args: &A) -> Result<Self, CacheError> {
        validate_operation(operation)?;

        let mut canonical = String::new();
        write_canonical(&serde_json::to_value(args)?, &mut canonical)?;
        let digest = Sha256::digest(format!("{operation}:{canonical}").as_bytes());
        Ok(Self {
            operation: operation.to_string(),
            digest: hex::encode(digest),
        })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.digest)
    }
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|left, right| left.0.cmp(right.0));
            out.push('{');
            for (index, (key, item)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

// Operation names become directory names.
fn validate_operation(operation: &str) -> Result<(), CacheError> {
    let valid = !operation.is_empty()
        && operation
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidOperation(operation.to_string()))
    }
}
