//! Newline-delimited JSON framing.

use futures_util::stream::{Stream, StreamExt};

use super::errors::StreamError;
use crate::record::Record;

/// One record as a single NDJSON line
pub fn encode_line(record: &Record) -> Result<String, StreamError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

/// Frames a record stream; an upstream error ends the framed stream
pub fn into_ndjson<S>(records: S) -> impl Stream<Item = Result<String, StreamError>>
where
    S: Stream<Item = Result<Record, StreamError>>,
{
    records.map(|item| item.and_then(|record| encode_line(&record)))
}
