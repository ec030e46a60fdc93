//! `meta.k8s.io/v1` Table wire type and federated merge
//!
//! k8s-openapi does not ship the Table type, so it is modelled here with
//! untyped cells. Row objects are kept as raw JSON because members render
//! them as `PartialObjectMetadata` or full objects depending on `includeObject`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kinds::tag_value;

/// API version of the Table kind
pub const TABLE_API_VERSION: &str = "meta.k8s.io/v1";

/// Name of the column prepended to federated tables
pub const CLUSTER_ID_COLUMN: &str = "Cluster Id";

/// Tabular rendering of a list or single object
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Always `meta.k8s.io/v1` on the wire
    #[serde(default)]
    pub api_version: String,
    /// Always `Table` on the wire
    #[serde(default)]
    pub kind: String,
    /// List metadata
    #[serde(default)]
    pub metadata: ListMeta,
    /// Column headers
    #[serde(default)]
    pub column_definitions: Vec<TableColumnDefinition>,
    /// Rows, one per object
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

/// Column header
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumnDefinition {
    /// Human readable name
    pub name: String,
    /// OpenAPI type of the cells
    #[serde(rename = "type")]
    pub type_: String,
    /// OpenAPI format of the cells
    #[serde(default)]
    pub format: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// 0 for columns shown by default
    #[serde(default)]
    pub priority: i32,
}

/// One row of a table
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    /// Cell values, one per column
    #[serde(default)]
    pub cells: Vec<Value>,
    /// Row conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Value>>,
    /// The object the row describes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

impl Table {
    /// Force the TypeMeta expected by table clients
    pub fn normalized(mut self) -> Self {
        self.api_version = TABLE_API_VERSION.to_string();
        self.kind = "Table".to_string();
        self
    }
}

fn cluster_id_column() -> TableColumnDefinition {
    TableColumnDefinition {
        name: CLUSTER_ID_COLUMN.to_string(),
        type_: "string".to_string(),
        format: String::new(),
        description: "Member cluster serving the object".to_string(),
        priority: 0,
    }
}

/// Merge per-member tables into one.
///
/// Columns come from the first table with a `Cluster Id` column prepended.
/// Rows from every member are concatenated in member order with the member
/// id as their first cell.
pub fn merge_tables(tables: Vec<(String, Table)>) -> Table {
    let mut merged = Table::default().normalized();

    let mut tables = tables.into_iter();
    let Some((first_member, first)) = tables.next() else {
        merged.column_definitions.push(cluster_id_column());
        return merged;
    };

    merged.column_definitions = std::iter::once(cluster_id_column())
        .chain(first.column_definitions.iter().cloned())
        .collect();

    for (member, table) in std::iter::once((first_member, first)).chain(tables) {
        for mut row in table.rows {
            row.cells.insert(0, Value::String(member.clone()));
            if let Some(object) = row.object.as_mut() {
                tag_value(object, &member);
            }
            merged.rows.push(row);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegate_common::CLUSTER_ID_ANNOTATION;
    use serde_json::json;

    fn member_table(names: &[&str]) -> Table {
        serde_json::from_value(json!({
            "kind": "Table",
            "apiVersion": "meta.k8s.io/v1",
            "metadata": {"resourceVersion": "42"},
            "columnDefinitions": [
                {"name": "Name", "type": "string", "format": "name", "description": "", "priority": 0},
                {"name": "Ready", "type": "string", "format": "", "description": "", "priority": 0},
                {"name": "Age", "type": "string", "format": "", "description": "", "priority": 0}
            ],
            "rows": names.iter().map(|n| json!({
                "cells": [n, "1/1", "5m"],
                "object": {"kind": "PartialObjectMetadata", "metadata": {"name": n}}
            })).collect::<Vec<_>>()
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_column_and_row_counts() {
        let merged = merge_tables(vec![
            ("us".to_string(), member_table(&["a", "b"])),
            ("eu".to_string(), member_table(&["c"])),
            ("ap".to_string(), member_table(&["d", "e", "f"])),
        ]);

        assert_eq!(merged.column_definitions.len(), 4);
        assert_eq!(merged.column_definitions[0].name, CLUSTER_ID_COLUMN);
        assert_eq!(merged.column_definitions[1].name, "Name");
        assert_eq!(merged.rows.len(), 6);
        assert_eq!(merged.kind, "Table");
        assert_eq!(merged.api_version, TABLE_API_VERSION);
    }

    #[test]
    fn test_merge_prefixes_cells_in_member_order() {
        let merged = merge_tables(vec![
            ("us".to_string(), member_table(&["a"])),
            ("eu".to_string(), member_table(&["b"])),
        ]);

        assert_eq!(merged.rows[0].cells[0], json!("us"));
        assert_eq!(merged.rows[0].cells[1], json!("a"));
        assert_eq!(merged.rows[1].cells[0], json!("eu"));
        assert_eq!(merged.rows[1].cells.len(), 4);
    }

    #[test]
    fn test_merge_annotates_row_objects() {
        let merged = merge_tables(vec![("eu".to_string(), member_table(&["a"]))]);
        let object = merged.rows[0].object.as_ref().unwrap();
        assert_eq!(
            object["metadata"]["annotations"][CLUSTER_ID_ANNOTATION],
            json!("eu")
        );
    }

    #[test]
    fn test_merge_drops_member_resource_version() {
        let merged = merge_tables(vec![("eu".to_string(), member_table(&["a"]))]);
        assert_eq!(merged.metadata.resource_version, None);
    }

    #[test]
    fn test_merge_no_members() {
        let merged = merge_tables(Vec::new());
        assert_eq!(merged.column_definitions.len(), 1);
        assert!(merged.rows.is_empty());
    }

    #[test]
    fn test_column_type_serializes_as_type() {
        let value = serde_json::to_value(cluster_id_column()).unwrap();
        assert_eq!(value["type"], json!("string"));
        assert!(value.get("type_").is_none());
    }
}
