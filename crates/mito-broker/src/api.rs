//! Typed operations on top of [`RequestBroker::send_raw`].
//!
//! Every method builds its closed operation schema from `mito_protocol::ops`
//! and picks a retry budget. Nothing here fails loudly: a missing reply,
//! an unparsable payload or a backend error all come back as values.

use mito_protocol::ops::{
    AddColumnParams, ApiCall, ChangeDtypeParams, CheckoutStepParams, CodeOptions,
    CodeOptionsParams, ColumnId, ColumnParams, DataframeRenameParams, DeleteColumnsParams,
    DropDuplicatesParams, EditOp, ExcelExportParams, ExcelFileMetadataParams, ExcelImportParams,
    FeedbackParams, FillMethod, FillNanParams, FilterEntry, FilterLocation, FilterOperator,
    FilterParams, FormulaRange, GetParamsParams, KeepDuplicates, LogEvent, MergeParams,
    PivotParams, QuestionAndAnswer, RenameColumnParams, RenderCountParams, ReorderColumnParams,
    ReplayAnalysisParams, SetCellValueParams, SetColumnFormulaParams, SheetParams,
    SimpleImportParams, SortDirection, SortParams, UniqueValueCountsParams, UniqueValueSort,
    UpdateOp,
};
use mito_protocol::payloads::{ExcelFileMetadata, PathContents, UniqueValueCounts};
use mito_protocol::{ErrorDescriptor, StepId};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::broker::{RequestBroker, SendOptions};
use crate::config::{LONG_OPERATION_RETRIES, QUICK_QUERY_RETRIES};

/// Result of an edit.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// The backend applied the step. Pass the id back in to overwrite it.
    Applied(StepId),
    /// The backend refused the edit.
    Rejected(ErrorDescriptor),
    /// No reply within the budget; the step may or may not exist.
    Unknown(StepId),
}

impl EditOutcome {
    /// The step id for outcomes that may have produced a step.
    pub fn step_id(&self) -> Option<&StepId> {
        match self {
            EditOutcome::Applied(step_id) | EditOutcome::Unknown(step_id) => Some(step_id),
            EditOutcome::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDescriptor> {
        match self {
            EditOutcome::Rejected(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied(_))
    }
}

/// Result of an update (undo, redo, settings, …).
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Acknowledged(Option<Value>),
    Rejected(ErrorDescriptor),
    Unknown,
}

impl RequestBroker {
    async fn edit(
        &self,
        op: EditOp,
        step_id: Option<StepId>,
        max_retries: Option<u32>,
    ) -> EditOutcome {
        let step_id = StepId::reuse_or_generate(step_id);
        let message = match op.into_message(step_id.clone()) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "mito::api", step_id = %step_id, error = %err, "failed to build edit");
                return EditOutcome::Unknown(step_id);
            }
        };
        let options = SendOptions {
            max_retries,
            do_not_wait_for_reply: false,
        };
        match self.send_raw(message, options).await {
            None => EditOutcome::Unknown(step_id),
            Some(reply) if reply.is_error() => EditOutcome::Rejected(reply.error_descriptor()),
            Some(_) => EditOutcome::Applied(step_id),
        }
    }

    async fn update(&self, op: UpdateOp, max_retries: Option<u32>) -> UpdateOutcome {
        let message = match op.into_message() {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "mito::api", error = %err, "failed to build update");
                return UpdateOutcome::Unknown;
            }
        };
        let options = SendOptions {
            max_retries,
            do_not_wait_for_reply: false,
        };
        match self.send_raw(message, options).await {
            None => UpdateOutcome::Unknown,
            Some(reply) if reply.is_error() => UpdateOutcome::Rejected(reply.error_descriptor()),
            Some(reply) => UpdateOutcome::Acknowledged(reply.data),
        }
    }

    /// Runs a read-only query and decodes its payload. Errors, timeouts and
    /// undecodable payloads all yield `None`.
    pub async fn query<T: DeserializeOwned>(
        &self,
        call: ApiCall,
        max_retries: Option<u32>,
    ) -> Option<T> {
        let message = match call.into_message() {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "mito::api", error = %err, "failed to build query");
                return None;
            }
        };
        let kind = message.kind.clone();
        let options = SendOptions {
            max_retries,
            do_not_wait_for_reply: false,
        };
        let reply = self.send_raw(message, options).await?;
        if reply.is_error() {
            debug!(target: "mito::api", kind = %kind, "query answered with an error");
            return None;
        }
        decode_payload(&kind, reply.data?)
    }

    // Edits.

    pub async fn edit_add_column(
        &self,
        sheet_index: usize,
        column_header: impl Into<String>,
        column_header_index: usize,
        step_id: Option<StepId>,
    ) -> EditOutcome {
        let op = EditOp::AddColumn(AddColumnParams {
            sheet_index,
            column_header: column_header.into(),
            column_header_index,
        });
        self.edit(op, step_id, None).await
    }

    pub async fn edit_delete_columns(
        &self,
        sheet_index: usize,
        column_ids: Vec<ColumnId>,
    ) -> EditOutcome {
        let op = EditOp::DeleteColumns(DeleteColumnsParams {
            sheet_index,
            column_ids,
        });
        self.edit(op, None, None).await
    }

    pub async fn edit_rename_column(
        &self,
        sheet_index: usize,
        column_id: impl Into<ColumnId>,
        new_column_header: impl Into<String>,
        level: Option<usize>,
        step_id: Option<StepId>,
    ) -> EditOutcome {
        let op = EditOp::RenameColumn(RenameColumnParams {
            sheet_index,
            column_id: column_id.into(),
            new_column_header: new_column_header.into(),
            level,
        });
        self.edit(op, step_id, None).await
    }

    pub async fn edit_reorder_column(
        &self,
        sheet_index: usize,
        column_id: impl Into<ColumnId>,
        new_column_index: usize,
    ) -> EditOutcome {
        let op = EditOp::ReorderColumn(ReorderColumnParams {
            sheet_index,
            column_id: column_id.into(),
            new_column_index,
        });
        self.edit(op, None, None).await
    }

    /// Filters a column. Passing the step id from a previous call replaces
    /// that filter step, which is how the filter menu edits live.
    pub async fn edit_filter(
        &self,
        sheet_index: usize,
        column_id: impl Into<ColumnId>,
        filters: Vec<FilterEntry>,
        operator: FilterOperator,
        filter_location: FilterLocation,
        step_id: Option<StepId>,
    ) -> EditOutcome {
        let op = EditOp::Filter(FilterParams {
            sheet_index,
            column_id: column_id.into(),
            operator,
            filters,
            filter_location,
        });
        self.edit(op, step_id, None).await
    }

    pub async fn edit_sort(
        &self,
        sheet_index: usize,
        column_id: impl Into<ColumnId>,
        sort_direction: SortDirection,
        step_id: Option<StepId>,
    ) -> EditOutcome {
        let op = EditOp::Sort(SortParams {
            sheet_index,
            column_id: column_id.into(),
            sort_direction,
        });
        self.edit(op, step_id, None).await
    }

    pub async fn edit_change_dtype(
        &self,
        sheet_index: usize,
        column_ids: Vec<ColumnId>,
        new_dtype: impl Into<String>,
        step_id: Option<StepId>,
    ) -> EditOutcome {
        let op = EditOp::ChangeDtype(ChangeDtypeParams {
            sheet_index,
            column_ids,
            new_dtype: new_dtype.into(),
        });
        self.edit(op, step_id, None).await
    }

    pub async fn edit_set_cell_value(
        &self,
        sheet_index: usize,
        column_id: impl Into<ColumnId>,
        row_index: Value,
        new_value: impl Into<String>,
    ) -> EditOutcome {
        let op = EditOp::SetCellValue(SetCellValueParams {
            sheet_index,
            column_id: column_id.into(),
            row_index,
            new_value: new_value.into(),
        });
        self.edit(op, None, None).await
    }

    pub async fn edit_set_column_formula(
        &self,
        sheet_index: usize,
        column_id: impl Into<ColumnId>,
        old_formula: impl Into<String>,
        new_formula: impl Into<String>,
        applied_to: FormulaRange,
    ) -> EditOutcome {
        let op = EditOp::SetColumnFormula(SetColumnFormulaParams {
            sheet_index,
            column_id: column_id.into(),
            old_formula: old_formula.into(),
            new_formula: new_formula.into(),
            index_labels_formula_is_applied_to: applied_to,
        });
        self.edit(op, None, None).await
    }

    pub async fn edit_drop_duplicates(
        &self,
        sheet_index: usize,
        column_ids: Vec<ColumnId>,
        keep: KeepDuplicates,
        step_id: Option<StepId>,
    ) -> EditOutcome {
        let op = EditOp::DropDuplicates(DropDuplicatesParams {
            sheet_index,
            column_ids,
            keep,
        });
        self.edit(op, step_id, None).await
    }

    pub async fn edit_merge(&self, params: MergeParams, step_id: Option<StepId>) -> EditOutcome {
        self.edit(EditOp::Merge(params), step_id, None).await
    }

    pub async fn edit_pivot(&self, params: PivotParams, step_id: Option<StepId>) -> EditOutcome {
        self.edit(EditOp::Pivot(params), step_id, None).await
    }

    pub async fn edit_fill_nan(
        &self,
        sheet_index: usize,
        fill_method: FillMethod,
        column_ids: Option<Vec<ColumnId>>,
        step_id: Option<StepId>,
    ) -> EditOutcome {
        let op = EditOp::FillNan(FillNanParams {
            sheet_index,
            fill_method,
            column_ids,
        });
        self.edit(op, step_id, None).await
    }

    pub async fn edit_dataframe_delete(&self, sheet_index: usize) -> EditOutcome {
        let op = EditOp::DataframeDelete(SheetParams { sheet_index });
        self.edit(op, None, None).await
    }

    pub async fn edit_dataframe_duplicate(&self, sheet_index: usize) -> EditOutcome {
        let op = EditOp::DataframeDuplicate(SheetParams { sheet_index });
        self.edit(op, None, None).await
    }

    pub async fn edit_dataframe_rename(
        &self,
        sheet_index: usize,
        new_dataframe_name: impl Into<String>,
        step_id: Option<StepId>,
    ) -> EditOutcome {
        let op = EditOp::DataframeRename(DataframeRenameParams {
            sheet_index,
            new_dataframe_name: new_dataframe_name.into(),
        });
        self.edit(op, step_id, None).await
    }

    /// Imports CSV files by name. Large files can take minutes.
    pub async fn edit_simple_import(&self, file_names: Vec<String>) -> EditOutcome {
        let op = EditOp::SimpleImport(SimpleImportParams { file_names });
        self.edit(op, None, Some(LONG_OPERATION_RETRIES)).await
    }

    pub async fn edit_excel_import(
        &self,
        file_name: impl Into<String>,
        sheet_names: Vec<String>,
        has_headers: bool,
        skiprows: u32,
    ) -> EditOutcome {
        let op = EditOp::ExcelImport(ExcelImportParams {
            file_name: file_name.into(),
            sheet_names,
            has_headers,
            skiprows,
        });
        self.edit(op, None, Some(LONG_OPERATION_RETRIES)).await
    }

    // Updates.

    pub async fn update_undo(&self) -> UpdateOutcome {
        self.update(UpdateOp::Undo, None).await
    }

    pub async fn update_redo(&self) -> UpdateOutcome {
        self.update(UpdateOp::Redo, None).await
    }

    pub async fn update_clear(&self) -> UpdateOutcome {
        self.update(UpdateOp::Clear, None).await
    }

    /// Re-runs a saved analysis; replays re-import data and can be slow.
    pub async fn update_replay_analysis(&self, analysis_name: impl Into<String>) -> UpdateOutcome {
        let op = UpdateOp::ReplayAnalysis(ReplayAnalysisParams {
            analysis_name: analysis_name.into(),
        });
        self.update(op, Some(LONG_OPERATION_RETRIES)).await
    }

    pub async fn update_checkout_step(&self, step_idx: usize) -> UpdateOutcome {
        let op = UpdateOp::CheckoutStep(CheckoutStepParams { step_idx });
        self.update(op, None).await
    }

    pub async fn update_render_count(
        &self,
        number_rendered_sheets: usize,
        theme: Option<String>,
    ) -> UpdateOutcome {
        let op = UpdateOp::RenderCount(RenderCountParams {
            number_rendered_sheets,
            theme,
        });
        self.update(op, None).await
    }

    pub async fn update_feedback(
        &self,
        feedback_id: impl Into<String>,
        num_usages: u32,
        questions_and_answers: Vec<QuestionAndAnswer>,
    ) -> UpdateOutcome {
        let op = UpdateOp::Feedback(FeedbackParams {
            feedback_id: feedback_id.into(),
            num_usages,
            questions_and_answers,
        });
        self.update(op, None).await
    }

    pub async fn update_code_options(&self, code_options: CodeOptions) -> UpdateOutcome {
        let op = UpdateOp::CodeOptions(CodeOptionsParams { code_options });
        self.update(op, None).await
    }

    // Queries.

    pub async fn get_datafiles(&self) -> Option<Vec<String>> {
        self.query(ApiCall::Datafiles, None).await
    }

    pub async fn get_path_contents(&self, path_parts: Vec<String>) -> Option<PathContents> {
        self.query(ApiCall::GetPathContents { path_parts }, None)
            .await
    }

    pub async fn get_path_joined(&self, path_parts: Vec<String>) -> Option<String> {
        self.query(ApiCall::GetPathJoin { path_parts }, Some(QUICK_QUERY_RETRIES))
            .await
    }

    pub async fn get_dataframe_as_csv(&self, sheet_index: usize) -> Option<String> {
        self.query(ApiCall::GetDataframeAsCsv { sheet_index }, None)
            .await
    }

    /// Base64-encoded workbook containing the given sheets.
    pub async fn get_dataframes_as_excel(&self, sheet_indexes: Vec<usize>) -> Option<String> {
        let call = ApiCall::GetDataframesAsExcel {
            params: ExcelExportParams { sheet_indexes },
        };
        self.query(call, Some(LONG_OPERATION_RETRIES)).await
    }

    pub async fn get_column_describe(
        &self,
        sheet_index: usize,
        column_id: impl Into<ColumnId>,
    ) -> Option<Map<String, Value>> {
        let call = ApiCall::GetColumnDescribe {
            params: ColumnParams {
                sheet_index,
                column_id: column_id.into(),
            },
        };
        self.query(call, None).await
    }

    pub async fn get_unique_value_counts(
        &self,
        sheet_index: usize,
        column_id: impl Into<ColumnId>,
        search_string: impl Into<String>,
        sort: UniqueValueSort,
    ) -> Option<UniqueValueCounts> {
        let call = ApiCall::GetUniqueValueCounts {
            params: UniqueValueCountsParams {
                sheet_index,
                column_id: column_id.into(),
                search_string: search_string.into(),
                sort,
            },
        };
        self.query(call, Some(QUICK_QUERY_RETRIES)).await
    }

    pub async fn get_excel_file_metadata(
        &self,
        file_path: impl Into<String>,
    ) -> Option<ExcelFileMetadata> {
        let call = ApiCall::GetExcelFileMetadata {
            params: ExcelFileMetadataParams {
                file_path: file_path.into(),
            },
        };
        self.query(call, Some(LONG_OPERATION_RETRIES)).await
    }

    pub async fn get_defined_df_names(&self) -> Option<Vec<String>> {
        self.query(ApiCall::GetDefinedDfNames, None).await
    }

    /// Parameters of the most recent step of `step_type` matching the filters.
    pub async fn get_params<T: DeserializeOwned>(
        &self,
        step_type: impl Into<String>,
        execution_data_to_match: Map<String, Value>,
        params_to_match: Map<String, Value>,
    ) -> Option<T> {
        let call = ApiCall::GetParams {
            params: GetParamsParams {
                step_type: step_type.into(),
                execution_data_to_match,
                params_to_match,
            },
        };
        self.query(call, None).await
    }

    // Logging.

    /// Fire-and-forget telemetry.
    pub async fn log(&self, event: LogEvent) {
        self.send(event.into_message(), SendOptions::fire_and_forget())
            .await;
    }
}

/// Payloads often arrive as JSON encoded inside a string; plain strings
/// (paths, CSV text) are accepted as-is when `T` is a string.
fn decode_payload<T: DeserializeOwned>(kind: &str, data: Value) -> Option<T> {
    let data = match data {
        Value::String(text) => match serde_json::from_str::<T>(&text) {
            Ok(decoded) => return Some(decoded),
            Err(_) => Value::String(text),
        },
        other => other,
    };
    match serde_json::from_value::<T>(data) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(target: "mito::api", kind, error = %err, "discarding undecodable payload");
            None
        }
    }
}
