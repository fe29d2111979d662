//! Signal-only tools: `askForConfirmation` and `generateExcel`.
//!
//! Neither tool runs anything on the server. Their validated input is handed
//! to the client, which asks the human (confirmation) or calls the export
//! endpoint (Excel). Nothing enforces that the model uses them before a heavy
//! query; the workflow lives in the system prompt.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input for the askForConfirmation tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AskForConfirmationInput {
    /// Confirmation message
    pub message: String,
    /// Query to be executed
    pub query_preview: String,
    /// Estimated number of rows
    pub estimated_rows: f64,
    /// Alternative approaches (e.g., export, aggregation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<String>>,
}

/// Input for the generateExcel tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateExcelInput {
    /// Query to export
    pub query: String,
    /// Excel filename
    pub filename: String,
    /// Sheet name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    /// Message explaining what data will be exported and how many rows
    pub message: String,
}

/// The human's answer to a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationOutcome {
    pub confirmed: bool,
}

/// A client reporting the answer to a pending `askForConfirmation` call.
///
/// `input` is the pending call's input, echoed back so the completed
/// invocation carries it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationReply {
    #[serde(default)]
    pub tool_call_id: Option<String>,
    pub input: serde_json::Value,
    pub confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_confirmation_input() {
        let input: AskForConfirmationInput = serde_json::from_value(json!({
            "message": "This returns 12,000 rows. Continue?",
            "queryPreview": "SELECT * FROM events",
            "estimatedRows": 12000,
            "alternatives": ["Export to Excel", "Aggregate by day"]
        }))
        .unwrap();
        assert_eq!(input.estimated_rows, 12000.0);
        assert_eq!(input.alternatives.map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_confirmation_requires_estimate() {
        let result: Result<AskForConfirmationInput, _> = serde_json::from_value(json!({
            "message": "Continue?",
            "queryPreview": "SELECT * FROM events"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_confirmation_reply_shape() {
        let reply: ConfirmationReply = serde_json::from_value(json!({
            "toolCallId": "call-1",
            "input": {"message": "Continue?"},
            "confirmed": false
        }))
        .unwrap();
        assert_eq!(reply.tool_call_id.as_deref(), Some("call-1"));
        assert!(!reply.confirmed);

        let missing: Result<ConfirmationReply, _> =
            serde_json::from_value(json!({"input": {}}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_excel_input_round_trips_camel_case() {
        let input: GenerateExcelInput = serde_json::from_value(json!({
            "query": "SELECT * FROM orders",
            "filename": "orders.xlsx",
            "sheetName": "Orders",
            "message": "Exporting 4,210 orders"
        }))
        .unwrap();
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["sheetName"], "Orders");
    }
}
