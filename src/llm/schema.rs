//! Field schemas for structured generation
//!
//! Each structured call site owns a fixed result type; the schema here only
//! drives the formatting instructions sent to the model and the JSON
//! extraction from its reply.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    StringArray,
}

impl FieldType {
    /// Map a JSON-schema type name; unknown names become `String`
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "string" => FieldType::String,
            "integer" => FieldType::Integer,
            "number" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "array" => FieldType::StringArray,
            _ => FieldType::String,
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            FieldType::String => json!({ "type": "string" }),
            FieldType::Integer => json!({ "type": "integer" }),
            FieldType::Number => json!({ "type": "number" }),
            FieldType::Boolean => json!({ "type": "boolean" }),
            FieldType::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub field_type: FieldType,
    pub description: &'static str,
}

impl SchemaField {
    pub const fn new(name: &'static str, field_type: FieldType, description: &'static str) -> Self {
        Self {
            name,
            field_type,
            description,
        }
    }
}

/// A result shape a structured call can be parsed into
pub trait StructuredResponse: DeserializeOwned + Send {
    fn schema() -> &'static [SchemaField];
}

/// JSON schema document for a field list
pub fn schema_document(fields: &[SchemaField]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        let mut property = field.field_type.json_schema();
        property["description"] = json!(field.description);
        properties.insert(field.name.to_string(), property);
    }

    let required: Vec<&str> = fields.iter().map(|f| f.name).collect();

    json!({
        "properties": properties,
        "required": required,
    })
}

/// Instructions appended to the system prompt of a structured call
pub fn format_instructions(fields: &[SchemaField]) -> String {
    let schema = serde_json::to_string(&schema_document(fields))
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You MUST format your response as a JSON object that follows this schema:
The output should be formatted as a JSON instance that conforms to the JSON schema below.

Here is the output schema:
```
{}
```
Return ONLY the JSON object, with no explanation text."#,
        schema
    )
}

/// Parse a model reply into `T`, tolerating code fences and surrounding prose
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let direct_error = match serde_json::from_str::<T>(cleaned) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };

    // Fallback: the outermost { ... } block
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            return serde_json::from_str::<T>(&cleaned[start..=end]).map_err(|e| e.to_string());
        }
    }

    Err(direct_error.to_string())
}
