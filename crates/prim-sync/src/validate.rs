//! Line-by-line validation of exported dataset records.
//!
//! Records are checked either against a flat field list mapped from portal
//! metadata or against a published JSON Schema document applied in full.

use std::fmt;
use std::io::BufRead;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::sync::SyncError;

/// Error details kept per report; counts beyond this stay exact.
pub const MAX_COLLECTED_ERRORS: usize = 100;

const JSON_SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// JSON type a record property may hold. `null` is accepted for every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    /// Map a portal field type. Unknown types are treated as text.
    pub fn from_portal_type(portal_type: &str) -> (Self, Option<&'static str>) {
        match portal_type {
            "int" => (Self::Integer, None),
            "double" => (Self::Number, None),
            "date" => (Self::String, Some("date")),
            "datetime" => (Self::String, Some("date-time")),
            "geo_point_2d" | "geo_shape" | "file" => (Self::Object, None),
            _ => (Self::String, None),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether a non-null value has this type. Floats with no fractional
    /// part count as integers.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            (Self::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    /// Accepted types; empty accepts anything.
    pub types: Vec<FieldType>,
    pub format: Option<String>,
}

impl SchemaField {
    fn accepts(&self, value: &Value) -> bool {
        value.is_null() || self.types.is_empty() || self.types.iter().any(|t| t.matches(value))
    }

    fn expected(&self) -> String {
        let names: Vec<&str> = self.types.iter().map(FieldType::as_str).collect();
        names.join(" or ")
    }
}

/// Flat object schema for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSchema {
    pub fields: Vec<SchemaField>,
}

impl DatasetSchema {
    /// Build from portal dataset metadata (`fields[].{name,type}`).
    pub fn from_portal_metadata(metadata: &Value) -> Self {
        let fields = metadata
            .get("fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|field| {
                        let name = field.get("name")?.as_str()?;
                        let portal_type = field.get("type").and_then(Value::as_str).unwrap_or("text");
                        let (field_type, format) = FieldType::from_portal_type(portal_type);
                        Some(SchemaField {
                            name: name.to_owned(),
                            types: vec![field_type],
                            format: format.map(str::to_owned),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { fields }
    }

    /// Render as a JSON Schema document with nullable properties.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = Map::new();
            if !field.types.is_empty() {
                let mut types: Vec<Value> =
                    field.types.iter().map(|t| json!(t.as_str())).collect();
                types.push(json!("null"));
                property.insert("type".into(), Value::Array(types));
            }
            if let Some(format) = &field.format {
                property.insert("format".into(), json!(format));
            }
            properties.insert(field.name.clone(), Value::Object(property));
        }

        json!({
            "$schema": JSON_SCHEMA_DIALECT,
            "type": "object",
            "properties": properties,
        })
    }

    /// Check one record, returning the first problem found.
    fn check(&self, record: &Value) -> Result<(), (String, Option<String>)> {
        let Value::Object(object) = record else {
            return Err(("record is not a JSON object".into(), None));
        };

        for field in &self.fields {
            match object.get(&field.name) {
                Some(value) if !field.accepts(value) => {
                    return Err((
                        format!("{} is not of type {}", value, field.expected()),
                        Some(field.name.clone()),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Schema a dataset's records are checked against.
pub enum RecordSchema {
    /// Field list mapped from portal metadata.
    Fields(DatasetSchema),
    /// A published JSON Schema, applied with every keyword it carries and
    /// saved exactly as fetched.
    Document {
        document: Value,
        validator: jsonschema::Validator,
    },
}

impl RecordSchema {
    /// Compile a JSON Schema document.
    pub fn document(document: Value) -> Result<Self, SyncError> {
        let validator = jsonschema::validator_for(&document)
            .map_err(|e| SyncError::InvalidSchema(e.to_string()))?;
        Ok(Self::Document {
            document,
            validator,
        })
    }

    /// The document written next to the validation report.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::Fields(schema) => schema.to_json_schema(),
            Self::Document { document, .. } => document.clone(),
        }
    }

    fn check(&self, record: &Value) -> Result<(), (String, Option<String>)> {
        match self {
            Self::Fields(schema) => schema.check(record),
            Self::Document { validator, .. } => match validator.iter_errors(record).next() {
                Some(error) => Err((error.to_string(), None)),
                None => Ok(()),
            },
        }
    }
}

impl From<DatasetSchema> for RecordSchema {
    fn from(schema: DatasetSchema) -> Self {
        Self::Fields(schema)
    }
}

impl fmt::Debug for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields(schema) => f.debug_tuple("Fields").field(schema).finish(),
            Self::Document { document, .. } => {
                f.debug_struct("Document").field("document", document).finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Json,
    Schema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub line: usize,
    pub kind: IssueKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Whether the invalid record count is above the tolerated threshold.
    pub fn exceeds(&self, max_invalid: usize) -> bool {
        self.invalid_records > max_invalid
    }

    fn record_issue(&mut self, issue: ValidationIssue, max_collected: usize) {
        self.invalid_records += 1;
        if self.errors.len() < max_collected {
            self.errors.push(issue);
        }
    }
}

/// Validate newline-delimited JSON records. Blank lines are skipped but still
/// advance the line number.
pub fn validate_lines<R: BufRead>(
    reader: R,
    schema: &RecordSchema,
    max_collected: usize,
) -> std::io::Result<ValidationReport> {
    let mut report = ValidationReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line_number = index + 1;
        report.total_records += 1;

        let record: Value = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(e) => {
                report.record_issue(
                    ValidationIssue {
                        line: line_number,
                        kind: IssueKind::Json,
                        message: e.to_string(),
                        field: None,
                    },
                    max_collected,
                );
                continue;
            }
        };

        match schema.check(&record) {
            Ok(()) => report.valid_records += 1,
            Err((message, field)) => report.record_issue(
                ValidationIssue {
                    line: line_number,
                    kind: IssueKind::Schema,
                    message,
                    field,
                },
                max_collected,
            ),
        }
    }

    Ok(report)
}
