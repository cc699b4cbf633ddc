//! Compiles a caller-supplied field-map into a typed record descriptor that
//! both drives LLM prompt generation and validates/coerces LLM output.
//!
//! Rust doesn't let us generate a struct type at runtime the way the source
//! system's dynamic-schema objects do; instead every field is carried as a
//! data-driven [`FieldSpec`] and validated generically by [`CompiledSchema::coerce`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The declared type of one schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    #[serde(rename = "list")]
    ListOfString,
}

impl FieldKind {
    /// The default JSON value for a field of this kind, per spec: `"N/A"`
    /// for string, `-1` for integer, `-1.0` for number, `false` for boolean,
    /// `[]` for list.
    pub fn default_value(self) -> Value {
        match self {
            FieldKind::String => Value::String("N/A".to_string()),
            FieldKind::Integer => Value::Number((-1).into()),
            FieldKind::Number => serde_json::Number::from_f64(-1.0)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::ListOfString => Value::Array(Vec::new()),
        }
    }

    fn fallback_hint(self) -> &'static str {
        match self {
            FieldKind::String => " (Use \"N/A\" if unknown)",
            FieldKind::Integer | FieldKind::Number => " (Use -1 if unknown)",
            FieldKind::Boolean => " (Use false if unmentioned)",
            FieldKind::ListOfString => " (Use [] if none found)",
        }
    }
}

/// A caller-supplied field definition prior to compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub description: String,
}

/// One compiled field: name, kind, a prompt-ready description (with the
/// fallback hint appended), and the default used when the LLM's value can't
/// be coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub description: String,
    pub default: Value,
}

/// An ordered field descriptor. Order is preserved because prompt stability
/// depends on field order — an `IndexMap` is used for the input so caller
/// insertion order survives compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledSchema {
    pub fields: Vec<FieldSpec>,
}

impl CompiledSchema {
    /// Compile an ordered field-map into a schema.
    pub fn compile(field_map: &IndexMap<String, FieldDef>) -> Self {
        let fields = field_map
            .iter()
            .map(|(name, def)| FieldSpec {
                name: name.clone(),
                kind: def.kind,
                description: format!("{}{}", def.description, def.kind.fallback_hint()),
                default: def.kind.default_value(),
            })
            .collect();
        Self { fields }
    }

    /// Concatenate an exclusion schema and an extraction schema into one
    /// descriptor, constraining the exclusion schema's fields to boolean
    /// kind regardless of what the caller declared.
    pub fn merge(exclusion: Option<&CompiledSchema>, extraction: Option<&CompiledSchema>) -> Self {
        let mut fields = Vec::new();
        if let Some(excl) = exclusion {
            fields.extend(excl.fields.iter().cloned().map(|mut f| {
                f.kind = FieldKind::Boolean;
                f.default = Value::Bool(false);
                f
            }));
        }
        if let Some(extr) = extraction {
            fields.extend(extr.fields.iter().cloned());
        }
        Self { fields }
    }

    /// True if no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render the schema as the JSON description embedded in LLM prompts:
    /// `{field_name: "kind - description", ...}`.
    pub fn prompt_description(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    Value::String(format!("{:?} - {}", f.kind, f.description)),
                )
            })
            .collect();
        Value::Object(map)
    }

    /// Validate and coerce a single field's raw JSON value against its
    /// declared kind. Kind mismatches are coerced where safe (a numeric
    /// string parses into integer/number when in range); anything else
    /// falls back to the field's default.
    pub fn coerce(spec: &FieldSpec, raw: Option<&Value>) -> Value {
        let Some(raw) = raw else {
            return spec.default.clone();
        };
        match spec.kind {
            FieldKind::String => match raw {
                Value::String(_) => raw.clone(),
                Value::Null => spec.default.clone(),
                other => Value::String(other.to_string()),
            },
            FieldKind::Boolean => match raw {
                Value::Bool(_) => raw.clone(),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => spec.default.clone(),
                },
                _ => spec.default.clone(),
            },
            FieldKind::Integer => match raw {
                Value::Number(n) if n.is_i64() || n.is_u64() => raw.clone(),
                Value::Number(n) => n
                    .as_f64()
                    .map(|f| Value::Number((f.round() as i64).into()))
                    .unwrap_or_else(|| spec.default.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(|v| Value::Number(v.into()))
                    .unwrap_or_else(|_| spec.default.clone()),
                _ => spec.default.clone(),
            },
            FieldKind::Number => match raw {
                Value::Number(_) => raw.clone(),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| spec.default.clone()),
                _ => spec.default.clone(),
            },
            FieldKind::ListOfString => match raw {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|v| match v {
                            Value::String(_) => v.clone(),
                            other => Value::String(other.to_string()),
                        })
                        .collect(),
                ),
                Value::String(s) => Value::Array(vec![Value::String(s.clone())]),
                _ => spec.default.clone(),
            },
        }
    }

    /// Coerce a whole LLM response object against this schema, field by
    /// field, returning a name->value map. Fields absent from `response`
    /// use their default.
    pub fn coerce_object(&self, response: &Value) -> IndexMap<String, Value> {
        let obj = response.as_object();
        self.fields
            .iter()
            .map(|f| {
                let raw = obj.and_then(|o| o.get(&f.name));
                (f.name.clone(), Self::coerce(f, raw))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> IndexMap<String, FieldDef> {
        let mut m = IndexMap::new();
        m.insert(
            "small_dataset".to_string(),
            FieldDef {
                kind: FieldKind::Boolean,
                description: "True if the dataset has fewer than 100 samples".to_string(),
            },
        );
        m.insert(
            "sample_size".to_string(),
            FieldDef {
                kind: FieldKind::Integer,
                description: "Reported sample size".to_string(),
            },
        );
        m
    }

    #[test]
    fn compile_preserves_order_and_appends_hint() {
        let compiled = CompiledSchema::compile(&sample_map());
        assert_eq!(compiled.fields[0].name, "small_dataset");
        assert_eq!(compiled.fields[1].name, "sample_size");
        assert!(compiled.fields[0].description.contains("Use false"));
        assert!(compiled.fields[1].description.contains("Use -1"));
    }

    #[test]
    fn merge_forces_exclusion_fields_boolean() {
        let mut wrong_kind = IndexMap::new();
        wrong_kind.insert(
            "excluded".to_string(),
            FieldDef {
                kind: FieldKind::String,
                description: "should become boolean".to_string(),
            },
        );
        let exclusion = CompiledSchema::compile(&wrong_kind);
        let merged = CompiledSchema::merge(Some(&exclusion), None);
        assert_eq!(merged.fields[0].kind, FieldKind::Boolean);
        assert_eq!(merged.fields[0].default, Value::Bool(false));
    }

    #[test]
    fn coerce_numeric_string_into_integer() {
        let spec = FieldSpec {
            name: "n".into(),
            kind: FieldKind::Integer,
            description: String::new(),
            default: Value::Number((-1).into()),
        };
        let coerced = CompiledSchema::coerce(&spec, Some(&Value::String("42".into())));
        assert_eq!(coerced, Value::Number(42.into()));
    }

    #[test]
    fn coerce_falls_back_to_default_on_mismatch() {
        let spec = FieldSpec {
            name: "n".into(),
            kind: FieldKind::Integer,
            description: String::new(),
            default: Value::Number((-1).into()),
        };
        let coerced = CompiledSchema::coerce(&spec, Some(&Value::String("not-a-number".into())));
        assert_eq!(coerced, Value::Number((-1).into()));
    }

    #[test]
    fn coerce_object_fills_missing_fields_with_defaults() {
        let compiled = CompiledSchema::compile(&sample_map());
        let response = serde_json::json!({ "small_dataset": true });
        let coerced = compiled.coerce_object(&response);
        assert_eq!(coerced["small_dataset"], Value::Bool(true));
        assert_eq!(coerced["sample_size"], Value::Number((-1).into()));
    }
}
