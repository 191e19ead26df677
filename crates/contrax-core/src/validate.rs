//! Field-level validation shared by local form checks and backend 400 bodies.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::contract::NewContract;

/// Minimum contract text length accepted by the create form.
pub const MIN_CONTRACT_TEXT_LEN: usize = 50;

/// Keys the backend uses for a single human-readable message.
pub const MESSAGE_KEYS: &[&str] = &["detail", "message", "error"];

/// Field → messages. `non_field_errors` carries messages not tied to a field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Parse a DRF validation body: `{"field": ["msg", ...], ...}`.
    ///
    /// Scalar strings are accepted as single messages. Returns `None` when the
    /// body is not an object of field errors (e.g. `{"detail": "..."}`).
    pub fn from_drf(body: &Value) -> Option<Self> {
        let obj = body.as_object()?;
        if obj.keys().all(|k| MESSAGE_KEYS.contains(&k.as_str())) {
            return None;
        }
        let mut errors = Self::default();
        for (field, value) in obj {
            match value {
                Value::String(msg) => errors.add(field, msg.clone()),
                Value::Array(items) => {
                    for item in items {
                        if let Some(msg) = item.as_str() {
                            errors.add(field, msg);
                        }
                    }
                }
                _ => {}
            }
        }
        if errors.is_empty() { None } else { Some(errors) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for msg in messages {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{field}: {msg}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl NewContract {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.title.trim().is_empty() {
            errors.add("title", "title is required");
        }
        if self.original_text.chars().count() < MIN_CONTRACT_TEXT_LEN {
            errors.add(
                "original_text",
                format!("text must be at least {MIN_CONTRACT_TEXT_LEN} characters"),
            );
        }
        if self.contract_type < 1 {
            errors.add("contract_type", "a contract type must be selected");
        }
        errors.into_result()
    }
}
