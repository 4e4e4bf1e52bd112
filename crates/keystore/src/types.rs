use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::oneshot;

/// The operation a request performs against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Read,
    Write,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Read => "READ",
            Operation::Write => "WRITE",
            Operation::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Declared type of a value
///
/// `None` accepts whatever concrete type is stored or supplied and skips
/// type-checking. The other variants map onto the JSON value kinds:
/// integers that fit in an `i64` are `Int`, every other number is `Float`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    String,
    Array,
    Map,
    None,
}

impl ValueType {
    /// The concrete type of a stored value. JSON `null` has no concrete type.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => ValueType::Bool,
            Value::Number(n) if n.is_i64() => ValueType::Int,
            Value::Number(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Map,
            Value::Null => ValueType::None,
        }
    }

    /// Whether `value` satisfies this declared type. Never coerces.
    pub fn matches(self, value: &Value) -> bool {
        self == ValueType::None || ValueType::of(value) == self
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "BOOL",
            ValueType::Int => "INT",
            ValueType::Float => "FLOAT",
            ValueType::String => "STRING",
            ValueType::Array => "ARRAY",
            ValueType::Map => "MAP",
            ValueType::None => "NONE",
        };
        f.write_str(name)
    }
}

/// A declared type paired with an untyped payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueHolder {
    #[serde(rename = "Type")]
    pub value_type: ValueType,
    #[serde(rename = "Val")]
    pub val: Value,
}

impl ValueHolder {
    pub fn new(value_type: ValueType, val: Value) -> Self {
        Self { value_type, val }
    }

    /// A holder carrying only a declared type (read requests, empty results)
    pub fn empty(value_type: ValueType) -> Self {
        Self::new(value_type, Value::Null)
    }
}

/// Result of a single request
///
/// `success` is true exactly when `error` is empty. Build responses through
/// [`Response::ok`] and [`Response::failure`] to keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub success: bool,
    pub error: String,
    pub value: ValueHolder,
}

impl Response {
    pub fn ok(value: ValueHolder) -> Self {
        Self {
            success: true,
            error: String::new(),
            value,
        }
    }

    pub fn failure(error: impl Into<String>, value: ValueHolder) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error.push_str("unknown error");
        }
        Self {
            success: false,
            error,
            value,
        }
    }

    /// Rebuild a response from its wire parts, deriving success from the error
    pub fn from_parts(error: String, value: ValueHolder) -> Self {
        if error.is_empty() {
            Self::ok(value)
        } else {
            Self::failure(error, value)
        }
    }
}

/// Receiving half of a request's private reply channel
pub type PendingResponse = oneshot::Receiver<Response>;

/// A request to the dispatcher together with its private reply channel
///
/// The reply channel is created fresh by each constructor and consumed by
/// [`Request::respond`].
#[derive(Debug)]
pub struct Request {
    pub op: Operation,
    pub key: String,
    pub value: ValueHolder,
    reply: oneshot::Sender<Response>,
}

impl Request {
    pub fn new(op: Operation, key: impl Into<String>, value: ValueHolder) -> (Self, PendingResponse) {
        let (reply, pending) = oneshot::channel();
        let request = Self {
            op,
            key: key.into(),
            value,
            reply,
        };
        (request, pending)
    }

    pub fn read(key: impl Into<String>, value_type: ValueType) -> (Self, PendingResponse) {
        Self::new(Operation::Read, key, ValueHolder::empty(value_type))
    }

    pub fn write(
        key: impl Into<String>,
        value_type: ValueType,
        val: Value,
    ) -> (Self, PendingResponse) {
        Self::new(Operation::Write, key, ValueHolder::new(value_type, val))
    }

    pub fn delete(key: impl Into<String>) -> (Self, PendingResponse) {
        Self::new(Operation::Delete, key, ValueHolder::empty(ValueType::None))
    }

    /// Deliver the response. Returns false if the requester stopped waiting.
    pub fn respond(self, response: Response) -> bool {
        self.reply.send(response).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_type_of() {
        assert_eq!(ValueType::of(&json!(true)), ValueType::Bool);
        assert_eq!(ValueType::of(&json!(-3)), ValueType::Int);
        assert_eq!(ValueType::of(&json!(2.5)), ValueType::Float);
        assert_eq!(ValueType::of(&json!(u64::MAX)), ValueType::Float);
        assert_eq!(ValueType::of(&json!("x")), ValueType::String);
        assert_eq!(ValueType::of(&json!([1, 2])), ValueType::Array);
        assert_eq!(ValueType::of(&json!({"a": 1})), ValueType::Map);
        assert_eq!(ValueType::of(&Value::Null), ValueType::None);
    }

    #[test]
    fn test_matches_never_coerces() {
        assert!(ValueType::Int.matches(&json!(1)));
        assert!(!ValueType::Float.matches(&json!(1)));
        assert!(!ValueType::Int.matches(&json!(1.0)));
        assert!(!ValueType::String.matches(&json!(1)));
        assert!(ValueType::None.matches(&json!({"k": [1, "two"]})));
    }

    #[test]
    fn test_response_envelope_json() {
        let response = Response::ok(ValueHolder::new(ValueType::String, json!("1")));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(
            encoded,
            json!({"Success": true, "Error": "", "Value": {"Type": "STRING", "Val": "1"}})
        );
    }

    #[test]
    fn test_response_success_tracks_error() {
        let failed = Response::failure("", ValueHolder::empty(ValueType::None));
        assert!(!failed.success);
        assert!(!failed.error.is_empty());

        let rebuilt = Response::from_parts(String::new(), ValueHolder::empty(ValueType::Bool));
        assert!(rebuilt.success);
    }

    #[tokio::test]
    async fn test_reply_channel_consumed_once() {
        let (request, pending) = Request::read("k", ValueType::Int);
        assert_eq!(request.op, Operation::Read);
        assert!(request.respond(Response::ok(ValueHolder::new(ValueType::Int, json!(7)))));
        let response = pending.await.unwrap();
        assert_eq!(response.value.val, json!(7));

        let (request, pending) = Request::delete("k");
        drop(pending);
        assert!(!request.respond(Response::ok(ValueHolder::empty(ValueType::None))));
    }
}
