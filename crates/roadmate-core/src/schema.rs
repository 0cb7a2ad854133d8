//! Typed tool input schemas.
//!
//! Every tool declares its inputs as a list of [`FieldSpec`]s. The registry
//! checks model-supplied arguments against the schema before a handler runs,
//! filling defaults, so handlers only ever see well-formed objects.

use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One declared input field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Guidance for the model.
    pub description: String,
    /// Permitted values for string fields. Empty means unrestricted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    /// Element type for array fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<FieldType>,
}

impl FieldSpec {
    pub fn required(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: true,
            default: None,
            description: description.to_string(),
            allowed: Vec::new(),
            items: None,
        }
    }

    pub fn optional(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type, description)
        }
    }

    /// Value used when the model omits the field. Implies optional.
    pub fn with_default(mut self, default: Value) -> Self {
        self.required = false;
        self.default = Some(default);
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn items(mut self, item_type: FieldType) -> Self {
        self.items = Some(item_type);
        self
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        if !self.field_type.matches(value) {
            return Err(format!(
                "field '{}' must be of type {}",
                self.name,
                self.field_type.as_str()
            ));
        }
        if !self.allowed.is_empty() {
            let s = value.as_str().unwrap_or_default();
            if !self.allowed.iter().any(|a| a == s) {
                return Err(format!(
                    "field '{}' must be one of: {}",
                    self.name,
                    self.allowed.join(", ")
                ));
            }
        }
        if let (Some(item_type), Some(items)) = (self.items, value.as_array()) {
            if let Some(pos) = items.iter().position(|v| !item_type.matches(v)) {
                return Err(format!(
                    "field '{}' element {} must be of type {}",
                    self.name,
                    pos,
                    item_type.as_str()
                ));
            }
        }
        Ok(())
    }

    fn to_json_schema(&self) -> Value {
        let mut prop = json!({
            "type": self.field_type.as_str(),
            "description": self.description,
        });
        if !self.allowed.is_empty() {
            prop["enum"] = json!(self.allowed);
        }
        if let Some(default) = &self.default {
            prop["default"] = default.clone();
        }
        if let Some(items) = self.items {
            prop["items"] = json!({ "type": items.as_str() });
        }
        prop
    }
}

/// Declared inputs of a tool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// JSON Schema object in the shape function-calling APIs expect.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check `args` against the schema and return the normalized object:
    /// declared fields only, defaults filled in.
    pub fn validate(&self, args: Value) -> Result<Value, String> {
        let mut provided = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(format!(
                    "arguments must be a JSON object, got {}",
                    type_name(&other)
                ))
            }
        };

        let mut normalized = Map::new();
        for field in &self.fields {
            match provided.remove(&field.name) {
                Some(value) if !value.is_null() => {
                    field.check(&value)?;
                    normalized.insert(field.name.clone(), value);
                }
                _ => {
                    if let Some(default) = &field.default {
                        normalized.insert(field.name.clone(), default.clone());
                    } else if field.required {
                        return Err(format!("missing required field '{}'", field.name));
                    }
                }
            }
        }

        if !provided.is_empty() {
            let ignored: Vec<&String> = provided.keys().collect();
            tracing::debug!("Ignoring undeclared tool arguments: {:?}", ignored);
        }

        Ok(Value::Object(normalized))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn order_schema() -> InputSchema {
        InputSchema::new()
            .field(
                FieldSpec::required("restaurant_type", FieldType::String, "Kind of restaurant")
                    .one_of(&["burger", "pizza", "salad"]),
            )
            .field(
                FieldSpec::required("item_ids", FieldType::Array, "Menu item ids")
                    .items(FieldType::String),
            )
            .field(FieldSpec::optional("note", FieldType::String, "Note for the kitchen"))
            .field(
                FieldSpec::optional("quantity", FieldType::Integer, "How many")
                    .with_default(json!(1)),
            )
    }

    #[test]
    fn test_validate_fills_defaults_and_drops_unknown() {
        let out = order_schema()
            .validate(json!({"restaurant_type": "burger", "item_ids": ["b3"], "extra": true}))
            .unwrap();
        assert_eq!(out["quantity"], 1);
        assert!(out.get("extra").is_none());
        assert!(out.get("note").is_none());
    }

    #[test]
    fn test_validate_missing_required() {
        let err = order_schema()
            .validate(json!({"restaurant_type": "burger"}))
            .unwrap_err();
        assert!(err.contains("item_ids"));
    }

    #[test]
    fn test_validate_rejects_wrong_type_and_enum() {
        let schema = order_schema();
        assert!(schema
            .validate(json!({"restaurant_type": 3, "item_ids": []}))
            .unwrap_err()
            .contains("type string"));
        assert!(schema
            .validate(json!({"restaurant_type": "sushi", "item_ids": []}))
            .unwrap_err()
            .contains("one of"));
        assert!(schema
            .validate(json!({"restaurant_type": "pizza", "item_ids": [1]}))
            .unwrap_err()
            .contains("element 0"));
    }

    #[test]
    fn test_validate_null_means_no_arguments() {
        let schema = InputSchema::new();
        assert_eq!(schema.validate(Value::Null).unwrap(), json!({}));
        assert!(schema.validate(json!("text")).is_err());
    }

    #[test]
    fn test_json_schema_shape() {
        let schema = order_schema().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["restaurant_type", "item_ids"]));
        assert_eq!(schema["properties"]["restaurant_type"]["enum"][1], "pizza");
        assert_eq!(schema["properties"]["item_ids"]["items"]["type"], "string");
        assert_eq!(schema["properties"]["quantity"]["default"], 1);
    }
}
