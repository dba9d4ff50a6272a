//! Read-only view over one decoded stream event.

use serde_json::{Map, Value};

/// Map of backend stage name to its reported status.
pub const EXECUTION_STATUS_FIELD: &str = "execution_status";
/// Map of stage name to error message.
pub const ERRORS_FIELD: &str = "errors";
/// Pause descriptor, one object or a list of them.
pub const INTERRUPT_FIELD: &str = "__interrupt__";
/// Terminal marker carrying the pipeline's final output.
pub const FINAL_OUTPUT_FIELD: &str = "final_output";

/// A decoded event. Every accessor tolerates absent or oddly shaped fields.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent(Value);

impl StreamEvent {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn into_raw(self) -> Value {
        self.0
    }

    /// Top-level field lookup; `None` unless the event is an object.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.as_object()?.get(name)
    }

    /// `(stage name, status)` pairs with string statuses.
    pub fn execution_status(&self) -> Option<impl Iterator<Item = (&str, &str)>> {
        let statuses = self.field(EXECUTION_STATUS_FIELD)?.as_object()?;
        Some(
            statuses
                .iter()
                .filter_map(|(name, status)| Some((name.as_str(), status.as_str()?))),
        )
    }

    /// The error map when present and non-empty.
    pub fn errors(&self) -> Option<&Map<String, Value>> {
        self.field(ERRORS_FIELD)?
            .as_object()
            .filter(|errors| !errors.is_empty())
    }

    /// The interrupt descriptor: the object itself, or the first element of a
    /// non-empty list.
    pub fn interrupt_descriptor(&self) -> Option<&Value> {
        match self.field(INTERRUPT_FIELD)? {
            Value::Array(items) => items.first(),
            descriptor @ Value::Object(_) => Some(descriptor),
            _ => None,
        }
    }

    /// The final output when present and non-null.
    pub fn final_output(&self) -> Option<&Value> {
        self.field(FINAL_OUTPUT_FIELD).filter(|value| !value.is_null())
    }
}

impl From<Value> for StreamEvent {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
