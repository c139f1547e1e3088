use serde_json::Value;

use crate::error::{BiiError, Result};

/// Attribute value as it arrived in the source table.
///
/// Some datasets store numbers as text; the variant is decided once at
/// ingestion and [`NumericValue::normalize`] is the only conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericValue {
    Raw(String),
    Parsed(f64),
}

impl NumericValue {
    /// Classify a JSON attribute; anything but text or a number is a schema error
    pub fn from_json(dataset: &str, field: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(NumericValue::Raw(s.clone())),
            Value::Number(n) => n.as_f64().map(NumericValue::Parsed).ok_or_else(|| {
                BiiError::data_source(dataset, format!("`{}` is not representable: {}", field, n))
            }),
            other => Err(BiiError::data_source(
                dataset,
                format!("`{}` is neither text nor a number: {}", field, other),
            )),
        }
    }

    /// Convert to a finite number, rejecting unparseable text
    pub fn normalize(self, dataset: &str) -> Result<f64> {
        let value = match self {
            NumericValue::Parsed(v) => v,
            NumericValue::Raw(text) => text.trim().parse::<f64>().map_err(|_| {
                BiiError::data_source(dataset, format!("cannot parse `{}` as a number", text))
            })?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(BiiError::data_source(
                dataset,
                format!("non-finite value {}", value),
            ))
        }
    }
}
