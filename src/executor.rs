use serde_json::Value as JsonValue;

use crate::adapters::{JsonRow, QueryResponse, row_object};
use crate::sqlite::{Query, QueryGuard};

impl QueryGuard<'_> {
    /// Run the held query once against `request` and build the response.
    ///
    /// Parameters are staged first; a rejected request never takes the
    /// connection lock. The connection lock is always released before this
    /// returns.
    pub fn run_json(&mut self, request: &JsonValue) -> QueryResponse {
        if self.bind_json(request).is_err() {
            return self.response(Vec::new());
        }

        let mut data = Vec::new();
        {
            let mut execution = self.prepare();
            execution.for_each_row(|columns| data.push(row_object(columns)));
            execution.release();
        }
        self.response(data)
    }

    fn response(&self, data: Vec<JsonRow>) -> QueryResponse {
        match self.error() {
            Some(message) => QueryResponse::failure(message),
            None => QueryResponse::ok(data),
        }
    }
}

/// Acquire `query`, run it against `request`, and release it.
///
/// Per-call failures come back as a failed response, never as a panic or `Err`.
pub fn execute(query: &Query, request: &JsonValue) -> QueryResponse {
    let mut guard = query.acquire();
    guard.run_json(request)
}
