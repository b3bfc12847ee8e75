use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Semantic column type used by the row generator and the sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Int,
    Float,
    Text,
    Date,
    Timestamp,
}

/// Ordered column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDef {
    pub name: String,
    pub semantic_type: SemanticType,
}

/// Column schema for one table, loaded from `<table>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Copy of this schema with an extra column appended.
    pub fn with_column(&self, name: &str, semantic_type: SemanticType) -> TableSchema {
        let mut columns = self.columns.clone();
        columns.push(ColumnDef {
            name: name.to_string(),
            semantic_type,
        });
        TableSchema {
            name: self.name.clone(),
            columns,
        }
    }
}

/// Resolves a table name to its column schema from a directory of JSON files.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    dir: PathBuf,
}

impl SchemaRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load `<dir>/<table>.json`. Missing or malformed files are errors scoped
    /// to the requested table.
    pub fn schema_for(&self, table: &str) -> Result<TableSchema, SchemaError> {
        let path = self.schema_path(table);
        if !path.exists() {
            return Err(SchemaError::Missing {
                table: table.to_string(),
                path: path.display().to_string(),
            });
        }
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents).map_err(|source| SchemaError::Malformed {
            table: table.to_string(),
            source,
        })
    }

    pub fn schema_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_schema_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bancodemo_schema_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp schema dir");
        dir
    }

    #[test]
    fn loads_schema_file() {
        let dir = temp_schema_dir();
        let schema = TableSchema {
            name: "clientes".to_string(),
            columns: vec![
                ColumnDef {
                    name: "id_usuario".to_string(),
                    semantic_type: SemanticType::Int,
                },
                ColumnDef {
                    name: "nome".to_string(),
                    semantic_type: SemanticType::Text,
                },
            ],
        };
        fs::write(
            dir.join("clientes.json"),
            serde_json::to_vec_pretty(&schema).expect("serialize schema"),
        )
        .expect("write schema file");

        let registry = SchemaRegistry::new(&dir);
        let loaded = registry.schema_for("clientes").expect("load schema");
        assert_eq!(loaded, schema);
        assert_eq!(loaded.column_names(), vec!["id_usuario", "nome"]);
    }

    #[test]
    fn missing_schema_is_table_scoped_error() {
        let registry = SchemaRegistry::new(temp_schema_dir());
        let err = registry.schema_for("desconhecida").unwrap_err();
        assert!(matches!(err, SchemaError::Missing { table, .. } if table == "desconhecida"));
    }

    #[test]
    fn malformed_schema_is_reported() {
        let dir = temp_schema_dir();
        fs::write(dir.join("clientes.json"), "{not json").expect("write file");
        let registry = SchemaRegistry::new(&dir);
        let err = registry.schema_for("clientes").unwrap_err();
        assert!(matches!(err, SchemaError::Malformed { table, .. } if table == "clientes"));
    }

    #[test]
    fn with_column_appends_at_end() {
        let schema = TableSchema {
            name: "t".to_string(),
            columns: vec![ColumnDef {
                name: "a".to_string(),
                semantic_type: SemanticType::Int,
            }],
        };
        let stamped = schema.with_column("data_execucao", SemanticType::Date);
        assert_eq!(stamped.columns.len(), 2);
        assert_eq!(stamped.columns[1].name, "data_execucao");
    }
}
