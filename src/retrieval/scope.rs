//! Scope normalization
//!
//! Callers pass file ids either one per element or as a JSON-encoded list
//! inside a single element (`["[\"a\",\"b\"]", "c"]`). Lists are flattened
//! one level; order is kept and duplicates are dropped.

use crate::error::{Error, Result};
use std::collections::HashSet;

pub fn normalize_scope(scope: &[Option<String>]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut flat = Vec::new();

    for (position, element) in scope.iter().enumerate() {
        let element = element.as_deref().ok_or_else(|| {
            Error::Validation(format!("Scope element {} is null", position))
        })?;

        if element.starts_with('[') {
            let ids: Vec<String> = serde_json::from_str(element).map_err(|e| {
                Error::Validation(format!(
                    "Scope element {} is not a JSON list of ids: {}",
                    position, e
                ))
            })?;
            for id in ids {
                if seen.insert(id.clone()) {
                    flat.push(id);
                }
            }
        } else if seen.insert(element.to_string()) {
            flat.push(element.to_string());
        }
    }

    Ok(flat)
}
