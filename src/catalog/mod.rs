// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Table-facing schema of a tablet.
//!
//! A [`TabletSchema`] is the schema the scanner sees. Column positions in it are
//! [`ColumnId`]s, while every column also carries a [`UniqueColumnId`] that stays
//! the same across schema changes and is what segments record.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::StorageResult;
use crate::types::{AggregationMethod, ColumnId, DataValue, FieldType, UniqueColumnId};

/// Description of one column in a [`TabletSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCatalog {
    unique_id: UniqueColumnId,
    name: String,
    field_type: FieldType,
    #[serde(default)]
    is_key: bool,
    #[serde(default)]
    is_nullable: bool,
    #[serde(default)]
    aggregation: AggregationMethod,
    /// Value produced for segments written before the column existed.
    #[serde(default)]
    default_value: Option<DataValue>,
}

impl ColumnCatalog {
    pub fn new(unique_id: UniqueColumnId, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            unique_id,
            name: name.into(),
            field_type,
            is_key: false,
            is_nullable: false,
            aggregation: AggregationMethod::None,
            default_value: None,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationMethod) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_default(mut self, value: DataValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn unique_id(&self) -> UniqueColumnId {
        self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }

    pub fn aggregation(&self) -> AggregationMethod {
        self.aggregation
    }

    /// Value of this column in rows that never stored it.
    pub fn default_value(&self) -> DataValue {
        match &self.default_value {
            Some(v) => v.clone(),
            None if self.is_nullable => DataValue::Null,
            None => DataValue::default_of(self.field_type),
        }
    }
}

/// Table schema, indexed by [`ColumnId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletSchema {
    columns: Vec<ColumnCatalog>,
}

pub type TabletSchemaRef = Arc<TabletSchema>;

impl TabletSchema {
    pub fn new(columns: Vec<ColumnCatalog>) -> Self {
        Self { columns }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn column(&self, id: ColumnId) -> Option<&ColumnCatalog> {
        self.columns.get(id as usize)
    }

    pub fn columns(&self) -> &[ColumnCatalog] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Table-facing id of the column with `unique_id`.
    pub fn column_id_of(&self, unique_id: UniqueColumnId) -> Option<ColumnId> {
        self.columns
            .iter()
            .position(|c| c.unique_id == unique_id)
            .map(|pos| pos as ColumnId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_value() {
        let c = ColumnCatalog::new(1, "v", FieldType::Int32);
        assert_eq!(c.default_value(), DataValue::Int32(0));
        let c = ColumnCatalog::new(1, "v", FieldType::Int32).nullable();
        assert_eq!(c.default_value(), DataValue::Null);
        let c = ColumnCatalog::new(1, "v", FieldType::Varchar).with_default("x".into());
        assert_eq!(c.default_value(), DataValue::from("x"));
    }

    #[test]
    fn test_schema_from_json() {
        let json = r#"{"columns": [
            {"unique_id": 10, "name": "k", "field_type": "Int64", "is_key": true},
            {"unique_id": 11, "name": "v", "field_type": "Varchar", "is_nullable": true,
             "aggregation": "Replace"}
        ]}"#;
        let schema: TabletSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.num_columns(), 2);
        assert!(schema.column(0).unwrap().is_key());
        assert_eq!(
            schema.column(1).unwrap().aggregation(),
            AggregationMethod::Replace
        );
        assert_eq!(schema.column_id_of(11), Some(1));
        assert_eq!(schema.column_id_of(12), None);
    }
}
