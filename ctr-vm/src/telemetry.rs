//! Session telemetry fields.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldType {
    App,
    Session,
    Performance,
    UserConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    U64(u64),
    F64(f64),
    Str(String),
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::U64(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::F64(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::U64(v) => write!(f, "{}", v),
            FieldValue::F64(v) => write!(f, "{:.3}", v),
            FieldValue::Str(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryField {
    pub field_type: FieldType,
    pub name: String,
    pub value: FieldValue,
}

/// Fields collected over one session, handed to the platform at shutdown.
#[derive(Debug, Default)]
pub struct TelemetrySession {
    fields: Vec<TelemetryField>,
}

impl TelemetrySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field. A field with the same name is replaced.
    pub fn add_field(&mut self, field_type: FieldType, name: &str, value: impl Into<FieldValue>) {
        let field = TelemetryField {
            field_type,
            name: name.to_string(),
            value: value.into(),
        };
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Describe the program being loaded.
    pub fn add_initial_info(&mut self, path: &Path, image: Option<&[u8]>) {
        self.add_field(FieldType::App, "Program_Path", path.display().to_string());
        if let Some(image) = image {
            let digest = Sha256::digest(image);
            self.add_field(FieldType::App, "Program_Sha256", hex::encode(digest));
            self.add_field(FieldType::App, "Program_Size", image.len() as u64);
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn fields(&self) -> &[TelemetryField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Close the session and take its fields.
    pub fn finalize(self) -> Vec<TelemetryField> {
        self.fields
    }
}
