//! Table metadata
//!
//! Static description of one table: physical name, ordered fields with their
//! declared kind, and the primary key. Built once and shared read-only.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared kind of a field, used to gate filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Date,
    Boolean,
    Json,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::Boolean => "boolean",
            FieldKind::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Json)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Table name must not be empty")]
    EmptyName,

    #[error("Table '{0}' must declare at least one primary key column")]
    MissingPrimaryKey(String),

    #[error("Table '{table}' declares field '{field}' more than once")]
    DuplicateField { table: String, field: String },

    #[error("Primary key column '{column}' is not a field of table '{table}'")]
    UnknownPrimaryKey { table: String, column: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMetadata {
    name: String,
    fields: Vec<Field>,
    primary_key: Vec<String>,
}

impl TableMetadata {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<Field>,
        primary_key: Vec<String>,
    ) -> Result<Self, TableError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TableError::EmptyName);
        }
        if primary_key.is_empty() {
            return Err(TableError::MissingPrimaryKey(name));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(TableError::DuplicateField {
                    table: name,
                    field: field.name.clone(),
                });
            }
        }
        if let Some(column) = primary_key.iter().find(|c| !seen.contains(c.as_str())) {
            return Err(TableError::UnknownPrimaryKey {
                table: name,
                column: column.clone(),
            });
        }

        Ok(Self {
            name,
            fields,
            primary_key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Declared kind, `None` for columns the table does not describe
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_kind(name).is_some()
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Default sort and identity column
    pub fn identity_column(&self) -> &str {
        // non-empty, checked in new()
        self.primary_key.first().map(String::as_str).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableMetadata {
        TableMetadata::new(
            "users",
            vec![
                Field::number("id"),
                Field::string("name"),
                Field::date("created_at"),
            ],
            vec!["id".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let table = users();
        assert_eq!(table.name(), "users");
        assert_eq!(table.identity_column(), "id");
        assert_eq!(table.field_kind("created_at"), Some(FieldKind::Date));
        assert_eq!(table.field_kind("missing"), None);
        assert_eq!(
            table.field_names().collect::<Vec<_>>(),
            vec!["id", "name", "created_at"]
        );
    }

    #[test]
    fn test_constructor_errors() {
        assert_eq!(
            TableMetadata::new(" ", vec![Field::number("id")], vec!["id".into()]),
            Err(TableError::EmptyName)
        );
        assert_eq!(
            TableMetadata::new("t", vec![Field::number("id")], vec![]),
            Err(TableError::MissingPrimaryKey("t".into()))
        );
        assert!(matches!(
            TableMetadata::new(
                "t",
                vec![Field::number("id"), Field::string("id")],
                vec!["id".into()]
            ),
            Err(TableError::DuplicateField { .. })
        ));
        assert!(matches!(
            TableMetadata::new("t", vec![Field::number("id")], vec!["uuid".into()]),
            Err(TableError::UnknownPrimaryKey { .. })
        ));
    }

    #[test]
    fn test_kind_serde() {
        let field: Field = serde_json::from_str(r#"{"name":"at","kind":"date"}"#).unwrap();
        assert_eq!(field, Field::date("at"));
        assert_eq!(serde_json::to_string(&FieldKind::Json).unwrap(), "\"json\"");
    }
}
