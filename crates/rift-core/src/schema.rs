use serde::Serialize;

use crate::value::{RowKey, Value};

/// A column of a table as declared in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    /// Declared type as written in the table definition (may be empty).
    pub decl_type: String,
    /// Position within the primary key (0-based), or None for non-key columns.
    pub key_position: Option<usize>,
}

impl Column {
    pub fn new(name: impl Into<String>, decl_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decl_type: decl_type.into(),
            key_position: None,
        }
    }

    pub fn key(name: impl Into<String>, decl_type: impl Into<String>, position: usize) -> Self {
        Self {
            name: name.into(),
            decl_type: decl_type.into(),
            key_position: Some(position),
        }
    }

    pub fn is_key(&self) -> bool {
        self.key_position.is_some()
    }
}

/// Table definition: name, ordered columns and the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_name(&self, index: usize) -> &str {
        self.columns
            .get(index)
            .map(|c| c.name.as_str())
            .unwrap_or("?")
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(Column::is_key)
    }

    pub fn is_key_column(&self, index: usize) -> bool {
        self.columns.get(index).is_some_and(Column::is_key)
    }

    /// Column indices of the primary key, in key order.
    pub fn key_columns(&self) -> Vec<usize> {
        let mut keyed: Vec<(usize, usize)> = self
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.key_position.map(|p| (p, i)))
            .collect();
        keyed.sort();
        keyed.into_iter().map(|(_, i)| i).collect()
    }

    /// Extract the primary key from a full row.
    pub fn key_of(&self, row: &[Value]) -> RowKey {
        RowKey::new(
            self.key_columns()
                .into_iter()
                .map(|i| row.get(i).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Key values paired with their column names.
    pub fn named_key(&self, key: &RowKey) -> Vec<(String, Value)> {
        self.key_columns()
            .into_iter()
            .zip(key.values())
            .map(|(i, v)| (self.columns[i].name.clone(), v.clone()))
            .collect()
    }

    /// Check that `other` describes the same table layout.
    ///
    /// Column names, column order and key positions must agree. Declared
    /// types are not compared; SQLite does not enforce them.
    pub fn check_compatible(&self, other: &TableSchema) -> Result<(), String> {
        if self.columns.len() != other.columns.len() {
            return Err(format!(
                "table '{}' has {} columns in one database and {} in the other",
                self.name,
                self.columns.len(),
                other.columns.len()
            ));
        }
        for (a, b) in self.columns.iter().zip(&other.columns) {
            if a.name != b.name {
                return Err(format!(
                    "table '{}' column mismatch: '{}' vs '{}'",
                    self.name, a.name, b.name
                ));
            }
            if a.key_position != b.key_position {
                return Err(format!(
                    "table '{}' primary key differs at column '{}'",
                    self.name, a.name
                ));
            }
        }
        Ok(())
    }

    pub fn same_declared_types(&self, other: &TableSchema) -> bool {
        self.columns
            .iter()
            .zip(&other.columns)
            .all(|(a, b)| a.decl_type.eq_ignore_ascii_case(&b.decl_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                Column::new("name", "TEXT"),
                Column::key("country", "TEXT", 1),
                Column::key("id", "INTEGER", 0),
            ],
        )
    }

    #[test]
    fn test_key_columns_follow_key_order() {
        assert_eq!(people().key_columns(), vec![2, 1]);
    }

    #[test]
    fn test_key_of_row() {
        let row = vec![Value::from("Ann"), Value::from("NZ"), Value::Integer(7)];
        assert_eq!(
            people().key_of(&row),
            RowKey::new(vec![Value::Integer(7), Value::from("NZ")])
        );
    }

    #[test]
    fn test_compatible_ignores_declared_type() {
        let mut other = people();
        other.columns[0].decl_type = "VARCHAR(20)".into();
        assert!(people().check_compatible(&other).is_ok());
        assert!(!people().same_declared_types(&other));
    }

    #[test]
    fn test_incompatible_key() {
        let mut other = people();
        other.columns[1].key_position = None;
        assert!(people().check_compatible(&other).is_err());

        let mut renamed = people();
        renamed.columns[0].name = "full_name".into();
        assert!(people().check_compatible(&renamed).is_err());
    }
}
