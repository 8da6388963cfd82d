pub mod entities;
pub mod graph;
pub mod relations;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;

use chrono::SecondsFormat;
use rusqlite::types::Type;

use types::Properties;

/// Encode an embedding as a little-endian f32 BLOB.
///
/// sqlite-vec reads vector BLOBs in host byte order, so distance functions
/// only agree with this encoding on little-endian hosts.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_bytes`]. Trailing bytes that do not form a full f32 are ignored.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(std::mem::size_of::<f32>())
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// New UUID v7 (time-sortable) record id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Fixed-width UTC timestamp, so string order is chronological order.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Numbered placeholder list `?start, ?start+1, …` for an `IN (…)` clause.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode a JSON object column, surfacing corruption as a conversion error.
pub(crate) fn parse_properties(idx: usize, text: &str) -> rusqlite::Result<Properties> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a `FromStr` enum column.
pub(crate) fn parse_enum<T>(idx: usize, text: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}
