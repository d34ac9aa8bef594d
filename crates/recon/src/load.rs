//! Source adapters: raw file contents into [`TabularSource`].
//!
//! Pure functions over `&str`; reading files is the caller's job.

use crate::config::{SourceConfig, SourceFormat};
use crate::error::ReconError;
use crate::model::{Record, TabularSource, Value};

/// Parse `data` according to `config.format`.
pub fn load_source(id: &str, data: &str, config: &SourceConfig) -> Result<TabularSource, ReconError> {
    let source = match config.format {
        SourceFormat::Csv => load_csv_source(id, data, config)?,
        SourceFormat::Json => load_json_source(id, data, config)?,
    };
    log::debug!("source '{}': loaded {} record(s)", id, source.records.len());
    Ok(source)
}

fn is_null_text(cell: &str, config: &SourceConfig) -> bool {
    let cell = cell.trim();
    cell.is_empty() || config.null_tokens.iter().any(|t| t.trim() == cell)
}

fn text_value(cell: &str, config: &SourceConfig) -> Value {
    if is_null_text(cell, config) {
        Value::Null
    } else {
        Value::Text(cell.to_string())
    }
}

/// Header row required. Every cell is text; blank cells and null tokens are null.
pub fn load_csv_source(id: &str, data: &str, config: &SourceConfig) -> Result<TabularSource, ReconError> {
    let load_err = |e: csv::Error| ReconError::Load {
        source: id.into(),
        message: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(config.delimiter as u8)
        .from_reader(data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(load_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    for key in &config.key_fields {
        if !headers.contains(key) {
            return Err(ReconError::MissingColumn {
                source: id.into(),
                column: key.clone(),
            });
        }
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(load_err)?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(h, cell)| (h.clone(), text_value(cell, config)))
            .collect();
        records.push(record);
    }

    Ok(TabularSource::new(id, config.key_fields.clone(), records).with_columns(headers))
}

/// A JSON array of flat objects, as extracted from a report's internal table.
pub fn load_json_source(id: &str, data: &str, config: &SourceConfig) -> Result<TabularSource, ReconError> {
    let load_err = |message: String| ReconError::Load {
        source: id.into(),
        message,
    };

    let parsed: serde_json::Value = serde_json::from_str(data).map_err(|e| load_err(e.to_string()))?;
    let rows = parsed
        .as_array()
        .ok_or_else(|| load_err("expected a JSON array of objects".into()))?;

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let object = row
            .as_object()
            .ok_or_else(|| load_err(format!("row {i}: expected an object")))?;

        let mut record = Record::new();
        for (field, value) in object {
            let value = match value {
                serde_json::Value::Null => Value::Null,
                serde_json::Value::Bool(b) => Value::Bool(*b),
                serde_json::Value::Number(n) => match n.as_f64() {
                    Some(n) => Value::Number(n),
                    None => return Err(load_err(format!("row {i}: field '{field}' is not a finite number"))),
                },
                serde_json::Value::String(s) => text_value(s, config),
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                    return Err(load_err(format!("row {i}: field '{field}' is not a scalar")));
                }
            };
            record.insert(field.clone(), value);
        }
        records.push(record);
    }

    if !records.is_empty() {
        for key in &config.key_fields {
            if !rows.iter().any(|r| r.get(key).is_some()) {
                return Err(ReconError::MissingColumn {
                    source: id.into(),
                    column: key.clone(),
                });
            }
        }
    }

    Ok(TabularSource::new(id, config.key_fields.clone(), records))
}
