//! Closed per-operation schemas.
//!
//! Each enum serialises to exactly the `type`/`params` (or flat field) shape
//! the backend expects; [`EditOp::into_message`] and friends then lift that
//! JSON into an [`OutboundMessage`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::envelope::{EventKind, OutboundMessage, ProtocolError, RESERVED_KEYS};
use crate::ids::StepId;

pub type ColumnId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum EditOp {
    #[serde(rename = "add_column_edit")]
    AddColumn(AddColumnParams),
    #[serde(rename = "delete_column_edit")]
    DeleteColumns(DeleteColumnsParams),
    #[serde(rename = "rename_column_edit")]
    RenameColumn(RenameColumnParams),
    #[serde(rename = "reorder_column_edit")]
    ReorderColumn(ReorderColumnParams),
    #[serde(rename = "filter_column_edit")]
    Filter(FilterParams),
    #[serde(rename = "sort_edit")]
    Sort(SortParams),
    #[serde(rename = "change_column_dtype_edit")]
    ChangeDtype(ChangeDtypeParams),
    #[serde(rename = "set_cell_value_edit")]
    SetCellValue(SetCellValueParams),
    #[serde(rename = "set_column_formula_edit")]
    SetColumnFormula(SetColumnFormulaParams),
    #[serde(rename = "drop_duplicates_edit")]
    DropDuplicates(DropDuplicatesParams),
    #[serde(rename = "merge_edit")]
    Merge(MergeParams),
    #[serde(rename = "pivot_edit")]
    Pivot(PivotParams),
    #[serde(rename = "fill_nan_edit")]
    FillNan(FillNanParams),
    #[serde(rename = "dataframe_delete_edit")]
    DataframeDelete(SheetParams),
    #[serde(rename = "dataframe_duplicate_edit")]
    DataframeDuplicate(SheetParams),
    #[serde(rename = "dataframe_rename_edit")]
    DataframeRename(DataframeRenameParams),
    #[serde(rename = "simple_import_edit")]
    SimpleImport(SimpleImportParams),
    #[serde(rename = "excel_import_edit")]
    ExcelImport(ExcelImportParams),
}

impl EditOp {
    pub fn into_message(self, step_id: StepId) -> Result<OutboundMessage, ProtocolError> {
        let message = lift(EventKind::EditEvent, serde_json::to_value(&self)?)?;
        Ok(message.with_step_id(step_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetParams {
    pub sheet_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddColumnParams {
    pub sheet_index: usize,
    pub column_header: String,
    pub column_header_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteColumnsParams {
    pub sheet_index: usize,
    pub column_ids: Vec<ColumnId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameColumnParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub new_column_header: String,
    /// Header level for multi-index columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderColumnParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub new_column_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLocation {
    Discrete,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub condition: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
    pub operator: FilterOperator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterEntry {
    Group(FilterGroup),
    Single(Filter),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub operator: FilterOperator,
    pub filters: Vec<FilterEntry>,
    pub filter_location: FilterLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub sort_direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDtypeParams {
    pub sheet_index: usize,
    pub column_ids: Vec<ColumnId>,
    pub new_dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetCellValueParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    /// Index label; not necessarily an integer.
    pub row_index: Value,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormulaRange {
    EntireColumn,
    SpecificIndexLabels { index_labels: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetColumnFormulaParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub old_formula: String,
    pub new_formula: String,
    pub index_labels_formula_is_applied_to: FormulaRange,
}

/// Which duplicate to keep; the backend expects `"first"`, `"last"` or `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepDuplicates {
    First,
    Last,
    None,
}

impl Serialize for KeepDuplicates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            KeepDuplicates::First => serializer.serialize_str("first"),
            KeepDuplicates::Last => serializer.serialize_str("last"),
            KeepDuplicates::None => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for KeepDuplicates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) if s == "first" => Ok(KeepDuplicates::First),
            Value::String(s) if s == "last" => Ok(KeepDuplicates::Last),
            Value::Bool(false) => Ok(KeepDuplicates::None),
            other => Err(serde::de::Error::custom(format!(
                "invalid keep value {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropDuplicatesParams {
    pub sheet_index: usize,
    pub column_ids: Vec<ColumnId>,
    pub keep: KeepDuplicates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeHow {
    Lookup,
    Left,
    Right,
    Inner,
    Outer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeParams {
    pub how: MergeHow,
    pub sheet_index_one: usize,
    pub sheet_index_two: usize,
    /// Pairs of (column in sheet one, column in sheet two).
    pub merge_key_column_ids: Vec<(ColumnId, ColumnId)>,
    pub selected_column_ids_one: Vec<ColumnId>,
    pub selected_column_ids_two: Vec<ColumnId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotParams {
    pub sheet_index: usize,
    pub pivot_rows_column_ids: Vec<ColumnId>,
    pub pivot_columns_column_ids: Vec<ColumnId>,
    /// Column id to the aggregation functions applied to it.
    pub values_column_ids_map: BTreeMap<ColumnId, Vec<String>>,
    /// Set when editing an existing pivot in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_sheet_index: Option<usize>,
    pub flatten_column_headers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FillMethod {
    Value { value: Value },
    Ffill,
    Bfill,
    Mean,
    Median,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillNanParams {
    pub sheet_index: usize,
    pub fill_method: FillMethod,
    /// `None` fills every column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_ids: Option<Vec<ColumnId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataframeRenameParams {
    pub sheet_index: usize,
    pub new_dataframe_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleImportParams {
    pub file_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcelImportParams {
    pub file_name: String,
    pub sheet_names: Vec<String>,
    pub has_headers: bool,
    pub skiprows: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum UpdateOp {
    #[serde(rename = "undo")]
    Undo,
    #[serde(rename = "redo")]
    Redo,
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "replay_analysis_update")]
    ReplayAnalysis(ReplayAnalysisParams),
    #[serde(rename = "checkout_step_by_idx_update")]
    CheckoutStep(CheckoutStepParams),
    #[serde(rename = "render_count_update")]
    RenderCount(RenderCountParams),
    #[serde(rename = "feedback_update")]
    Feedback(FeedbackParams),
    #[serde(rename = "code_options_update")]
    CodeOptions(CodeOptionsParams),
}

impl UpdateOp {
    pub fn into_message(self) -> Result<OutboundMessage, ProtocolError> {
        let mut message = lift(EventKind::UpdateEvent, serde_json::to_value(&self)?)?;
        // The backend reads `params` unconditionally, even for undo/redo.
        if message.params.is_none() {
            message.params = Some(Value::Object(Map::new()));
        }
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayAnalysisParams {
    pub analysis_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutStepParams {
    pub step_idx: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCountParams {
    pub number_rendered_sheets: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAndAnswer {
    pub question: String,
    pub answer: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackParams {
    pub feedback_id: String,
    pub num_usages: u32,
    pub questions_and_answers: Vec<QuestionAndAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeOptions {
    pub as_function: bool,
    pub call_function: bool,
    pub function_name: String,
    #[serde(default)]
    pub function_params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeOptionsParams {
    pub code_options: CodeOptions,
}

/// Read-only queries. Some carry flat top-level fields instead of `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApiCall {
    #[serde(rename = "datafiles")]
    Datafiles,
    #[serde(rename = "get_path_contents")]
    GetPathContents { path_parts: Vec<String> },
    #[serde(rename = "get_path_join")]
    GetPathJoin { path_parts: Vec<String> },
    #[serde(rename = "get_dataframe_as_csv")]
    GetDataframeAsCsv { sheet_index: usize },
    #[serde(rename = "get_dataframe_as_excel")]
    GetDataframesAsExcel { params: ExcelExportParams },
    #[serde(rename = "get_column_describe")]
    GetColumnDescribe { params: ColumnParams },
    #[serde(rename = "get_unique_value_counts")]
    GetUniqueValueCounts { params: UniqueValueCountsParams },
    #[serde(rename = "get_excel_file_metadata")]
    GetExcelFileMetadata { params: ExcelFileMetadataParams },
    #[serde(rename = "get_defined_df_names")]
    GetDefinedDfNames,
    #[serde(rename = "get_params")]
    GetParams { params: GetParamsParams },
}

impl ApiCall {
    pub fn into_message(self) -> Result<OutboundMessage, ProtocolError> {
        lift(EventKind::ApiCall, serde_json::to_value(&self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcelExportParams {
    pub sheet_indexes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueValueSort {
    AscendingValue,
    DescendingValue,
    AscendingPct,
    DescendingPct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueValueCountsParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub search_string: String,
    pub sort: UniqueValueSort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcelFileMetadataParams {
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetParamsParams {
    pub step_type: String,
    #[serde(default)]
    pub execution_data_to_match: Map<String, Value>,
    #[serde(default)]
    pub params_to_match: Map<String, Value>,
}

/// Telemetry event; its params are sent as flat top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub name: String,
    pub params: Map<String, Value>,
}

impl LogEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Adds a param. Keys the envelope owns (`id`, `event`, ...) are ignored.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !RESERVED_KEYS.contains(&key.as_str()) {
            self.params.insert(key, value);
        }
        self
    }

    pub fn into_message(self) -> OutboundMessage {
        self.params
            .into_iter()
            .fold(OutboundMessage::new(EventKind::LogEvent, self.name), |message, (key, value)| {
                message.with_field(key, value)
            })
    }
}

/// Splits a serialised operation into `type`, `params` and flat extras.
fn lift(event: EventKind, value: Value) -> Result<OutboundMessage, ProtocolError> {
    let Value::Object(mut map) = value else {
        return Err(ProtocolError::Malformed(
            "operation did not serialise to an object".into(),
        ));
    };
    let kind = match map.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => {
            return Err(ProtocolError::Malformed(
                "operation is missing its type tag".into(),
            ))
        }
    };
    let params = map.remove("params");
    let mut message = OutboundMessage::new(event, kind);
    message.params = params;
    Ok(map
        .into_iter()
        .fold(message, |message, (key, value)| message.with_field(key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_edit_matches_wire_schema() {
        let op = EditOp::Filter(FilterParams {
            sheet_index: 0,
            column_id: "A".into(),
            operator: FilterOperator::And,
            filters: vec![FilterEntry::Single(Filter {
                condition: "greater".into(),
                value: json!(5),
            })],
            filter_location: FilterLocation::Discrete,
        });
        let message = op.into_message(StepId::from("step-1")).expect("lift");
        assert_eq!(message.event, EventKind::EditEvent);
        assert_eq!(message.kind, "filter_column_edit");
        assert_eq!(message.step_id, Some(StepId::from("step-1")));
        assert_eq!(
            message.params,
            Some(json!({
                "sheet_index": 0,
                "column_id": "A",
                "operator": "And",
                "filters": [{"condition": "greater", "value": 5}],
                "filter_location": "discrete"
            }))
        );
        assert!(message.extra.is_empty());
    }

    #[test]
    fn undo_carries_empty_params() {
        let message = UpdateOp::Undo.into_message().expect("lift");
        assert_eq!(message.event, EventKind::UpdateEvent);
        assert_eq!(message.kind, "undo");
        assert_eq!(message.params, Some(json!({})));
    }

    #[test]
    fn path_queries_use_flat_fields() {
        let message = ApiCall::GetPathContents {
            path_parts: vec!["home".into(), "data".into()],
        }
        .into_message()
        .expect("lift");
        assert_eq!(message.kind, "get_path_contents");
        assert!(message.params.is_none());
        assert_eq!(message.extra.get("path_parts"), Some(&json!(["home", "data"])));
    }

    #[test]
    fn unit_queries_have_only_a_type() {
        let message = ApiCall::Datafiles.into_message().expect("lift");
        assert_eq!(message.kind, "datafiles");
        assert!(message.params.is_none());
        assert!(message.extra.is_empty());
    }

    #[test]
    fn keep_none_serialises_as_false() {
        let params = DropDuplicatesParams {
            sheet_index: 1,
            column_ids: vec!["A".into()],
            keep: KeepDuplicates::None,
        };
        let value = serde_json::to_value(&params).expect("encode");
        assert_eq!(value["keep"], json!(false));
        let back: DropDuplicatesParams = serde_json::from_value(value).expect("decode");
        assert_eq!(back.keep, KeepDuplicates::None);
    }

    #[test]
    fn log_event_flattens_params() {
        let message = LogEvent::new("clicked_undo")
            .with_param("source", json!("toolbar"))
            .into_message();
        assert_eq!(message.event, EventKind::LogEvent);
        assert_eq!(message.kind, "clicked_undo");
        assert_eq!(message.extra.get("source"), Some(&json!("toolbar")));
    }

    #[test]
    fn log_params_cannot_replace_envelope_keys() {
        let mut event = LogEvent::new("clicked")
            .with_param("id", json!("_spoof"))
            .with_param("event", json!("edit_event"))
            .with_param("source", json!("toolbar"));
        assert!(!event.params.contains_key("id"));

        event.params.insert("type".into(), json!("undo"));
        let message = event.into_message();
        assert_eq!(message.kind, "clicked");
        assert_eq!(message.event, EventKind::LogEvent);
        assert_eq!(message.extra.len(), 1);
        assert_eq!(message.extra.get("source"), Some(&json!("toolbar")));
    }
}
