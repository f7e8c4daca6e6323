//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling validation of
//! desired attributes before any remote call and telling the differ which
//! attributes are computed and which force replacement.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    String,
    Int,
    Float,
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    List(Box<AttributeType>),
    Map(Box<AttributeType>),
    /// Nested object with its own attribute schemas
    Object(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Object(fields), Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => {
                            field
                                .attr_type
                                .validate(v)
                                .map_err(|e| TypeError::MapValueError {
                                    key: field.name.clone(),
                                    inner: Box::new(e),
                                })?
                        }
                        None if field.required => {
                            return Err(TypeError::MissingRequired {
                                name: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                if let Some(unknown) = map.keys().find(|k| !fields.iter().any(|f| &f.name == *k))
                {
                    return Err(TypeError::UnknownAttribute {
                        name: unknown.clone(),
                    });
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name().to_string(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Float => "Float".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Object(_) => "Object".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is read-only and cannot be set")]
    ReadOnly { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// The provider fills this value; when the user leaves it unset the plan
    /// keeps whatever the current state holds.
    pub computed: bool,
    /// Computed attribute the user may not set at all
    pub read_only: bool,
    /// A change to this attribute cannot be applied in place
    pub force_new: bool,
    /// Value is masked in plan output
    pub sensitive: bool,
    /// Sent on create but never reported back by reads
    pub write_only: bool,
    /// List whose entries must all exist remotely; order and extra remote
    /// entries are not drift
    pub additive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// API-side field name when it differs from the attribute name
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            read_only: false,
            force_new: false,
            sensitive: false,
            write_only: false,
            additive: false,
            default: None,
            description: None,
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.computed = true;
        self.read_only = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn additive(mut self) -> Self {
        self.additive = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Names of attributes whose change forces replacement
    pub fn force_new_attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .values()
            .filter(|a| a.force_new)
            .map(|a| a.name.as_str())
    }

    pub fn is_computed(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.computed)
    }

    pub fn is_force_new(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.force_new)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.sensitive)
    }

    pub fn is_additive(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.additive)
    }

    /// Whether a read can omit this attribute without it counting as drift
    pub fn is_unechoed(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .is_some_and(|a| a.sensitive || a.write_only)
    }

    /// Fill unset attributes that declare a default, including fields of
    /// nested objects
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            match attributes.get_mut(name) {
                Some(value) => fill_nested_defaults(&schema.attr_type, value),
                None => {
                    if let Some(default) = &schema.default {
                        attributes.insert(name.clone(), default.clone());
                    }
                }
            }
        }
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            match self.attributes.get(name) {
                Some(schema) if schema.read_only => {
                    errors.push(TypeError::ReadOnly { name: name.clone() })
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(TypeError::MapValueError {
                            key: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn fill_nested_defaults(attr_type: &AttributeType, value: &mut Value) {
    match (attr_type, value) {
        (AttributeType::Object(fields), Value::Map(map)) => {
            for field in fields {
                match map.get_mut(&field.name) {
                    Some(inner) => fill_nested_defaults(&field.attr_type, inner),
                    None => {
                        if let Some(default) = &field.default {
                            map.insert(field.name.clone(), default.clone());
                        }
                    }
                }
            }
        }
        (AttributeType::List(inner), Value::List(items)) => {
            for item in items {
                fill_nested_defaults(inner, item);
            }
        }
        (AttributeType::Map(inner), Value::Map(map)) => {
            for item in map.values_mut() {
                fill_nested_defaults(inner, item);
            }
        }
        _ => {}
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// List of strings
    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }
}
