use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;

use farebot_core::IataCode;

/// Flat JSON argument mapping, the only shape that crosses the tool seam.
pub type ArgumentMap = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-empty free text.
    Text,
    Integer,
    /// `YYYY-MM-DD`.
    Date,
    /// Three-letter IATA airport code, normalized to upper case.
    IataCode,
    /// One of a fixed label set, normalized to upper case.
    Choice(&'static [&'static str]),
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self { name, description, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self { name, description, kind, required: false }
    }
}

/// Immutable declaration of one backend-callable operation.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: Vec<FieldSpec>,
    /// Read-only tools are idempotent and safe to retry; everything else
    /// gets exactly one attempt per dispatch.
    pub read_only: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

/// Every violated field of one validation pass, reported together so a
/// single corrected extraction can fix them all.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid arguments for `{tool}`: {}", render_violations(.violations))]
pub struct SchemaViolations {
    pub tool: String,
    pub violations: Vec<FieldViolation>,
}

fn render_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|violation| format!("{} ({})", violation.field, violation.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ToolSpec {
    /// Validates and normalizes an argument mapping against this schema.
    ///
    /// Collects every violation - missing required fields, unknown fields,
    /// uncoercible values - instead of stopping at the first one.
    pub fn validate(&self, arguments: &ArgumentMap) -> Result<ArgumentMap, SchemaViolations> {
        let mut violations = Vec::new();
        let mut normalized = ArgumentMap::new();

        for field in &self.fields {
            match arguments.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        violations.push(FieldViolation {
                            field: field.name.to_string(),
                            reason: "required field is missing".to_string(),
                        });
                    }
                }
                Some(value) => match coerce(field.kind, value) {
                    Ok(coerced) => {
                        normalized.insert(field.name.to_string(), coerced);
                    }
                    Err(reason) => {
                        violations.push(FieldViolation { field: field.name.to_string(), reason });
                    }
                },
            }
        }

        for key in arguments.keys() {
            if !self.fields.iter().any(|field| field.name == key) {
                violations.push(FieldViolation {
                    field: key.clone(),
                    reason: "unknown field".to_string(),
                });
            }
        }

        if violations.is_empty() {
            Ok(normalized)
        } else {
            Err(SchemaViolations { tool: self.name.to_string(), violations })
        }
    }

    /// One-line-per-field rendering used in extraction prompts.
    pub fn prompt_summary(&self) -> String {
        let mut lines = vec![format!("Tool `{}`: {}", self.name, self.description)];
        for field in &self.fields {
            let requirement = if field.required { "required" } else { "optional" };
            lines.push(format!(
                "- {} ({}, {}): {}",
                field.name,
                kind_label(field.kind),
                requirement,
                field.description
            ));
        }
        lines.join("\n")
    }
}

fn kind_label(kind: FieldKind) -> String {
    match kind {
        FieldKind::Text => "text".to_string(),
        FieldKind::Integer => "integer".to_string(),
        FieldKind::Date => "date YYYY-MM-DD".to_string(),
        FieldKind::IataCode => "3-letter IATA code".to_string(),
        FieldKind::Choice(options) => format!("one of {}", options.join("|")),
    }
}

fn coerce(kind: FieldKind, value: &Value) -> Result<Value, String> {
    match kind {
        FieldKind::Text => match value {
            Value::String(text) if !text.trim().is_empty() => {
                Ok(Value::String(text.trim().to_string()))
            }
            Value::String(_) => Err("must not be empty".to_string()),
            other => Err(format!("expected text, got {}", type_name(other))),
        },
        FieldKind::Integer => match value {
            Value::Number(number) if number.is_i64() || number.is_u64() => Ok(value.clone()),
            Value::Number(_) => Err("expected an integer, got a fraction".to_string()),
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("`{text}` is not an integer")),
            other => Err(format!("expected integer, got {}", type_name(other))),
        },
        FieldKind::Date => match value {
            Value::String(text) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
                .map_err(|_| format!("`{text}` is not a YYYY-MM-DD date")),
            other => Err(format!("expected a YYYY-MM-DD date, got {}", type_name(other))),
        },
        FieldKind::IataCode => match value {
            Value::String(text) => IataCode::new(text)
                .map(|code| Value::String(code.as_str().to_string()))
                .map_err(|error| error.to_string()),
            other => Err(format!("expected an IATA code, got {}", type_name(other))),
        },
        FieldKind::Choice(options) => match value {
            Value::String(text) => {
                let upper = text.trim().to_ascii_uppercase();
                if options.contains(&upper.as_str()) {
                    Ok(Value::String(upper))
                } else {
                    Err(format!("`{text}` is not one of {}", options.join("|")))
                }
            }
            other => Err(format!("expected a choice label, got {}", type_name(other))),
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
