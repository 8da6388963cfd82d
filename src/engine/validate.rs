//! Input checks run before any storage or embedding I/O.
//!
//! Every failure is a `ValidationError` whose context names the offending field.

use chrono::{DateTime, NaiveDate};

use crate::error::{MemoryError, Result};
use crate::memory::graph::{MAX_TRAVERSAL_DEPTH, MAX_TRAVERSAL_LIMIT};
use crate::memory::search::MAX_SEARCH_LIMIT;
use crate::memory::types::{EntityPatch, FieldPatch, MAX_PAGE_LIMIT};

pub const MAX_RELATION_TYPE_LEN: usize = 64;

pub fn owner(value: &str) -> Result<()> {
    non_empty("owner_id", value)
}

pub fn non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MemoryError::validation(field, format!("{field} must not be empty")));
    }
    Ok(())
}

pub fn unit_interval(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(MemoryError::validation(
            field,
            format!("{field} must be between 0 and 1, got {value}"),
        ));
    }
    Ok(())
}

/// Required fields may be changed but not cleared; set values must be valid.
pub fn entity_patch(patch: &EntityPatch) -> Result<()> {
    if matches!(patch.name, FieldPatch::Clear) {
        return Err(MemoryError::validation("name", "name cannot be null"));
    }
    if matches!(patch.entity_type, FieldPatch::Clear) {
        return Err(MemoryError::validation("type", "type cannot be null"));
    }
    if matches!(patch.confidence, FieldPatch::Clear) {
        return Err(MemoryError::validation("confidence", "confidence cannot be null"));
    }
    if let Some(name) = patch.name.as_set() {
        non_empty("name", name)?;
    }
    if let Some(confidence) = patch.confidence.as_set() {
        unit_interval("confidence", *confidence)?;
    }
    Ok(())
}

pub fn relation_type(value: &str) -> Result<()> {
    let len = value.chars().count();
    if value.trim().is_empty() || len > MAX_RELATION_TYPE_LEN {
        return Err(MemoryError::validation(
            "type",
            format!("relation type must be 1 to {MAX_RELATION_TYPE_LEN} characters"),
        ));
    }
    Ok(())
}

pub fn depth(field: &str, value: usize) -> Result<()> {
    in_range(field, value, 1, MAX_TRAVERSAL_DEPTH)
}

pub fn traversal_limit(value: usize) -> Result<()> {
    in_range("limit", value, 1, MAX_TRAVERSAL_LIMIT)
}

pub fn search_limit(value: usize) -> Result<()> {
    in_range("limit", value, 1, MAX_SEARCH_LIMIT)
}

pub fn page_limit(value: usize) -> Result<()> {
    in_range("limit", value, 1, MAX_PAGE_LIMIT)
}

/// Cosine scores live in `[-1, 1]`; a threshold outside that keeps nothing or everything.
pub fn threshold(value: f64) -> Result<()> {
    if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
        return Err(MemoryError::validation(
            "threshold",
            format!("threshold must be between -1 and 1, got {value}"),
        ));
    }
    Ok(())
}

pub fn tags(values: &[String]) -> Result<()> {
    match values.iter().position(|t| t.trim().is_empty()) {
        Some(i) => Err(MemoryError::validation(
            &format!("tags[{i}]"),
            "tags must be non-empty strings",
        )),
        None => Ok(()),
    }
}

/// Both bounds must parse (RFC 3339 or `YYYY-MM-DD`), and `from <= to` when both are set.
pub fn validity(from: Option<&str>, to: Option<&str>) -> Result<()> {
    let from = from.map(|v| parse_date("valid_from", v)).transpose()?;
    let to = to.map(|v| parse_date("valid_to", v)).transpose()?;

    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(MemoryError::validation(
                "valid_from",
                "valid_from must not be after valid_to",
            ));
        }
    }
    Ok(())
}

fn parse_date(field: &str, value: &str) -> Result<DateTime<chrono::Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&chrono::Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            MemoryError::validation(field, format!("{field} is not a date: {value:?}"))
        })
}

fn in_range(field: &str, value: usize, min: usize, max: usize) -> Result<()> {
    if value < min || value > max {
        return Err(MemoryError::validation(
            field,
            format!("{field} must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(())
}
