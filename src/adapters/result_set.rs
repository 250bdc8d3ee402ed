use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::SqlwError;
use crate::types::TypedValue;

/// One result row: a member per declared column, in column order.
pub type JsonRow = Map<String, JsonValue>;

/// Response document of one run: `{success, error?, data}`.
///
/// `data` is always present. It is empty on failure and for statements that
/// return no rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Vec<JsonRow>,
}

impl QueryResponse {
    #[must_use]
    pub fn ok(data: Vec<JsonRow>) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: Vec::new(),
        }
    }

    /// The response for an error raised at the execute boundary.
    #[must_use]
    pub fn from_error(err: &SqlwError) -> Self {
        Self::failure(err.to_string())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// The untyped response document.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let mut doc = Map::new();
        doc.insert("success".into(), JsonValue::Bool(self.success));
        if let Some(error) = &self.error {
            doc.insert("error".into(), JsonValue::String(error.clone()));
        }
        doc.insert(
            "data".into(),
            JsonValue::Array(self.data.iter().cloned().map(JsonValue::Object).collect()),
        );
        JsonValue::Object(doc)
    }
}

impl From<QueryResponse> for JsonValue {
    fn from(response: QueryResponse) -> Self {
        response.to_json()
    }
}

/// Encode the current column values as one row object.
#[must_use]
pub fn row_object(columns: &[TypedValue]) -> JsonRow {
    columns
        .iter()
        .map(|column| (column.name().to_owned(), column.to_json()))
        .collect()
}
