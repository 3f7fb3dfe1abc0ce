/*
 *  plugin/schema.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Schema declarations and value report checking
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PluginError, Result};

/// Primitive type a schema field may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Number,
    String,
    #[serde(alias = "boolean")]
    Bool,
}

impl TypeTag {
    /// Whether `value` conforms to this tag
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            TypeTag::Number => value.is_number(),
            TypeTag::String => value.is_string(),
            TypeTag::Bool => value.is_boolean(),
        }
    }
}

/// Field name to type tag, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<(String, TypeTag)>,
}

impl Schema {
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeTag)>,
        S: Into<String>,
    {
        let mut schema = Self::default();
        for (name, tag) in fields {
            let name = name.into();
            match schema.fields.iter_mut().find(|(n, _)| *n == name) {
                Some(field) => field.1 = tag,
                None => schema.fields.push((name, tag)),
            }
        }
        schema
    }

    /// Parse a `describe_schema` payload
    pub fn parse(json: &str) -> Result<Self> {
        let map: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| PluginError::ContractViolation(format!("schema is not a JSON object: {}", e)))?;

        let mut fields = Vec::with_capacity(map.len());
        for (name, tag) in map {
            let tag: TypeTag = serde_json::from_value(tag.clone())
                .map_err(|_| PluginError::ContractViolation(format!("field '{}' has unknown type tag {}", name, tag)))?;
            fields.push((name, tag));
        }

        Ok(Self { fields })
    }

    pub fn to_json(&self) -> Result<String> {
        let map: Map<String, Value> = self.fields.iter()
            .map(|(name, tag)| -> Result<(String, Value)> {
                Ok((name.clone(), serde_json::to_value(tag)?))
            })
            .collect::<Result<_>>()?;
        Ok(serde_json::to_string(&map)?)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, TypeTag)> {
        self.fields.iter().map(|(name, tag)| (name.as_str(), *tag))
    }

    pub fn tag(&self, name: &str) -> Option<TypeTag> {
        self.fields.iter()
            .find(|(n, _)| n == name)
            .map(|(_, tag)| *tag)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check a value report against this schema
    ///
    /// The report must be a JSON object whose keys are all declared, each
    /// holding a value of the declared type.
    pub fn check_report(&self, json: &str) -> Result<()> {
        let report: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| PluginError::ContractViolation(format!("report is not a JSON object: {}", e)))?;

        for (key, value) in &report {
            let tag = self.tag(key)
                .ok_or_else(|| PluginError::ContractViolation(format!("report key '{}' is not in the schema", key)))?;
            if !tag.accepts(value) {
                return Err(PluginError::ContractViolation(format!(
                    "report key '{}' holds {} but is declared {:?}", key, value, tag
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDIO: &str = r#"{"Volume":"number","IsMuted":"bool","Name":"string"}"#;

    #[test]
    fn test_parse_keeps_order() {
        let schema = Schema::parse(AUDIO).unwrap();
        let names: Vec<&str> = schema.fields().map(|(n, _)| n).collect();
        assert_eq!(names, ["Volume", "IsMuted", "Name"]);
        assert_eq!(schema.tag("IsMuted"), Some(TypeTag::Bool));
        assert_eq!(schema.to_json().unwrap(), AUDIO);
    }

    #[test]
    fn test_parse_rejects_unknown_tag() {
        let err = Schema::parse(r#"{"Volume":"float"}"#).unwrap_err();
        assert!(matches!(err, PluginError::ContractViolation(_)));

        assert!(Schema::parse(r#"["Volume"]"#).is_err());
    }

    #[test]
    fn test_report_subset_is_accepted() {
        let schema = Schema::parse(AUDIO).unwrap();
        schema.check_report(r#"{"Volume":40,"IsMuted":false,"Name":"Speakers"}"#).unwrap();
        schema.check_report(r#"{"Volume":40}"#).unwrap();
        schema.check_report("{}").unwrap();
    }

    #[test]
    fn test_report_unknown_key() {
        let schema = Schema::parse(AUDIO).unwrap();
        let err = schema.check_report(r#"{"Volume":40,"Balance":0}"#).unwrap_err();
        assert!(err.to_string().contains("'Balance' is not in the schema"));
    }

    #[test]
    fn test_report_wrong_type() {
        let schema = Schema::parse(AUDIO).unwrap();
        // a number field must never carry a quoted string
        let err = schema.check_report(r#"{"Volume":"40"}"#).unwrap_err();
        assert!(matches!(err, PluginError::ContractViolation(_)));
    }

    #[test]
    fn test_from_fields_deduplicates() {
        let schema = Schema::from_fields([
            ("Seconds", TypeTag::Number),
            ("Seconds", TypeTag::String),
        ]);
        assert_eq!(schema.len(), 1);
        assert_eq!(schema.tag("Seconds"), Some(TypeTag::String));
    }
}
