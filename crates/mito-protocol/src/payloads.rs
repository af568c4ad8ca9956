//! Decoded `data` payloads of read-only queries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathElement {
    pub name: String,
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathContents {
    pub path_parts: Vec<String>,
    pub elements: Vec<PathElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueValueCounts {
    /// Rows of `[value, count, percent, is_not_filtered_out]`.
    #[serde(rename = "uniqueValueRowDataArray")]
    pub rows: Vec<Vec<Value>>,
    #[serde(rename = "isAllData")]
    pub is_all_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcelFileMetadata {
    pub sheet_names: Vec<String>,
    pub size: u64,
}
