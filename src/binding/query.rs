//! Structured template binding for parameterized queries
//!
//! Instead of interpolating token values into query text, every token is
//! replaced by a named placeholder (`{a.b}` becomes `@a_b`) and its value is
//! returned as a separate parameter. The text is bound against a replacement
//! tree that mirrors the referenced token paths.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::data::BindingData;
use super::template::{format_value, BindingTemplate};
use crate::error::BindError;
use crate::jsonpath;

/// A named query parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: String,
}

/// Query text with `@name` placeholders plus their values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterizedQuery {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SqlParameter>,
}

impl ParameterizedQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Placeholder name for a token: `@` + token, with path and dash characters as `_`
pub fn parameter_name(token: &str) -> String {
    let escaped: String = token
        .chars()
        .map(|c| match c {
            '.' | '-' | '[' | ']' => '_',
            other => other,
        })
        .collect();
    format!("@{escaped}")
}

/// Replacement tree for a template: each token path maps to its placeholder.
///
/// `{a.b}` yields `{"a": {"b": "@a_b"}}`; only referenced paths are created.
pub fn replacement_data(template: &BindingTemplate) -> Result<Map<String, Value>, BindError> {
    let mut replacements = Map::new();
    for token in template.parameter_names() {
        let segments = jsonpath::parse(token)?;
        jsonpath::insert(
            &mut replacements,
            &segments,
            Value::String(parameter_name(token)),
        );
    }
    Ok(replacements)
}

/// Bind a template into a parameterized query
pub fn template_bind(
    template: &BindingTemplate,
    data: &BindingData,
) -> Result<ParameterizedQuery, BindError> {
    let replacements = BindingData::from(replacement_data(template)?);
    let text = template.bind(&replacements)?;

    let mut parameters = Vec::new();
    for token in template.parameter_names() {
        let value = data.resolve(token)?;
        parameters.push(SqlParameter {
            name: parameter_name(token),
            value: format_value(token, value)?,
        });
    }

    Ok(ParameterizedQuery { text, parameters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn dotted_token_becomes_nested_placeholder() {
        let template = BindingTemplate::parse("SELECT * FROM c WHERE c.x = {a.b}").unwrap();
        let data = BindingData::new().with("a", json!({"b": "5"}));

        assert_eq!(
            Value::Object(replacement_data(&template).unwrap()),
            json!({"a": {"b": "@a_b"}})
        );

        let query = template_bind(&template, &data).unwrap();
        assert_eq!(query.text, "SELECT * FROM c WHERE c.x = @a_b");
        assert_eq!(
            query.parameters,
            vec![SqlParameter {
                name: "@a_b".to_string(),
                value: "5".to_string()
            }]
        );
    }

    #[test]
    fn repeated_tokens_share_one_parameter() {
        let template =
            BindingTemplate::parse("SELECT * FROM c WHERE c.id = {id} OR c.parent = {id}").unwrap();
        let data = BindingData::new().with("id", "abc");

        let query = template_bind(&template, &data).unwrap();
        assert_eq!(query.text, "SELECT * FROM c WHERE c.id = @id OR c.parent = @id");
        assert_eq!(query.parameters.len(), 1);
        assert_eq!(query.parameter("@id"), Some("abc"));
    }

    #[test]
    fn dashes_and_indexes_are_escaped() {
        assert_eq!(parameter_name("partition-key"), "@partition_key");
        assert_eq!(parameter_name("items[0].sku"), "@items_0__sku");

        let template = BindingTemplate::parse("{items[0].sku}").unwrap();
        let data = BindingData::new().with("items", json!([{"sku": "s-1"}]));
        let query = template_bind(&template, &data).unwrap();
        assert_eq!(query.text, "@items_0__sku");
        assert_eq!(query.parameter("@items_0__sku"), Some("s-1"));
    }

    #[test]
    fn injection_stays_in_parameters() {
        let template = BindingTemplate::parse("SELECT * FROM c WHERE c.name = {name}").unwrap();
        let data = BindingData::new().with("name", "x' OR 1=1 --");

        let query = template_bind(&template, &data).unwrap();
        assert!(!query.text.contains("OR 1=1"));
        assert_eq!(query.parameter("@name"), Some("x' OR 1=1 --"));
    }

    #[test]
    fn missing_value_fails() {
        let template = BindingTemplate::parse("{missing}").unwrap();
        assert!(matches!(
            template_bind(&template, &BindingData::new()),
            Err(BindError::BindingDataMissing { .. })
        ));
    }
}
