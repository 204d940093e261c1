//! Delimited text → header-keyed rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }
}

#[derive(Debug, Error)]
pub enum TabularError {
    #[error("malformed delimited text at record {record}: {source}")]
    Malformed {
        record: usize,
        #[source]
        source: csv::Error,
    },
}

/// One data row. Headers are shared between all rows of a parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularRow {
    headers: Arc<[String]>,
    values: Vec<String>,
}

impl TabularRow {
    /// Value under `header`; unknown headers read as empty.
    pub fn get(&self, header: &str) -> &str {
        self.headers
            .iter()
            .position(|h| h == header)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Parse delimited text whose first row is the header.
///
/// With `quoted` set, fields may be wrapped in `"` and contain the delimiter,
/// newlines and doubled quotes. Short rows are padded with empty strings, a
/// blank trailing row is dropped, and input without at least one data row
/// yields no rows.
pub fn parse_delimited(
    text: &str,
    delimiter: Delimiter,
    quoted: bool,
) -> Result<Vec<TabularRow>, TabularError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .quoting(quoted)
        .double_quote(true)
        .flexible(true)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|source| TabularError::Malformed { record: idx, source })?;
        records.push(record);
    }
    if records
        .last()
        .is_some_and(|last| last.iter().all(|field| field.is_empty()))
    {
        records.pop();
    }
    if records.len() < 2 {
        return Ok(Vec::new());
    }

    let mut records = records.into_iter();
    let headers: Arc<[String]> = match records.next() {
        Some(header) => header.iter().map(ToString::to_string).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(records
        .map(|record| {
            let mut values: Vec<String> = record
                .iter()
                .take(headers.len())
                .map(ToString::to_string)
                .collect();
            values.resize(headers.len(), String::new());
            TabularRow {
                headers: Arc::clone(&headers),
                values,
            }
        })
        .collect())
}
