//! Schema introspection.
//!
//! One introspection query runs per session, immediately after the
//! transport is ready. The result is indexed by type and field name so the
//! query builder can reject unknown selections before anything reaches the
//! wire.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::{ClientError, ClientResult};

/// The single introspection query executed at session start.
pub const INTROSPECTION_QUERY: &str = "query IntrospectSchema { __schema { queryType { name } \
     types { name kind fields { name type { name kind ofType { name kind ofType { name kind \
     ofType { name kind } } } } } } } }";

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(rename = "queryType")]
    query_type: RawNamed,
    types: Vec<RawType>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawType {
    name: Option<String>,
    kind: String,
    #[serde(default)]
    fields: Option<Vec<RawField>>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    field_type: RawTypeRef,
}

#[derive(Debug, Deserialize)]
struct RawTypeRef {
    name: Option<String>,
    #[serde(default)]
    #[serde(rename = "ofType")]
    of_type: Option<Box<RawTypeRef>>,
}

impl RawTypeRef {
    /// Unwrap NON_NULL / LIST wrappers down to the named type.
    fn named(&self) -> Option<&str> {
        match (&self.name, &self.of_type) {
            (Some(name), _) => Some(name),
            (None, Some(inner)) => inner.named(),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    /// Named return type after unwrapping non-null and list wrappers.
    pub type_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub fields: BTreeMap<String, FieldDef>,
}

/// Indexed view of an introspected schema.
#[derive(Debug, Clone)]
pub struct SchemaIndex {
    query_type: String,
    types: BTreeMap<String, TypeDef>,
}

impl SchemaIndex {
    /// Build the index from the `data` payload of the introspection query.
    pub fn from_introspection(data: &Value) -> ClientResult<Self> {
        let raw: RawSchema = serde_json::from_value(
            data.get("__schema")
                .cloned()
                .ok_or_else(|| ClientError::Parse("introspection data has no __schema".into()))?,
        )
        .map_err(|e| ClientError::Parse(format!("malformed introspection result: {}", e)))?;

        let mut types = BTreeMap::new();
        for raw_type in raw.types {
            let (Some(name), Some(fields)) = (raw_type.name, raw_type.fields) else {
                continue;
            };
            // Introspection meta-types are not selectable through the DSL.
            if name.starts_with("__") || raw_type.kind != "OBJECT" {
                continue;
            }
            let fields = fields
                .into_iter()
                .map(|f| {
                    (
                        f.name.clone(),
                        FieldDef {
                            name: f.name,
                            type_name: f.field_type.named().map(str::to_string),
                        },
                    )
                })
                .collect();
            types.insert(name.clone(), TypeDef { name, fields });
        }

        Ok(Self {
            query_type: raw.query_type.name,
            types,
        })
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldDef> {
        self.types.get(type_name)?.fields.get(field)
    }
}
