use serde_json::Value as JsonValue;

use crate::error::SqlwError;
use crate::sqlite::QueryGuard;

impl QueryGuard<'_> {
    /// Stage every declared parameter from the members of `request`.
    ///
    /// Each parameter is looked up by name and must carry exactly the JSON type of
    /// its kind. Stops at the first parameter that is missing or mistyped and
    /// records `Invalid request parameter: <name>` as this run's error. Nothing
    /// touches the connection.
    ///
    /// # Errors
    /// Returns `SqlwError::ParameterError` with the offending parameter name.
    pub fn bind_json(&mut self, request: &JsonValue) -> Result<(), SqlwError> {
        let mut failed = None;
        for parameter in self.parameters_mut() {
            let accepted = request
                .get(parameter.name())
                .is_some_and(|member| parameter.from_json(member));
            if !accepted {
                failed = Some(parameter.name().to_owned());
                break;
            }
        }

        match failed {
            None => Ok(()),
            Some(name) => {
                let err = SqlwError::ParameterError(name);
                tracing::debug!(query = %self.query().name(), error = %err, "request rejected");
                self.record_error(err.to_string());
                Err(err)
            }
        }
    }
}
