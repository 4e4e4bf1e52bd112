// Protobuf messages for the stream and datagram transports
pub mod wire {
    use std::collections::HashMap;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Op {
        Read = 0,
        Write = 1,
        Delete = 2,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ValueType {
        None = 0,
        Bool = 1,
        Int = 2,
        Float = 3,
        String = 4,
        Array = 5,
        Map = 6,
    }

    /// A JSON-like value; an unset `kind` is null
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Value {
        #[prost(oneof = "value::Kind", tags = "1, 2, 3, 4, 5, 6")]
        pub kind: Option<value::Kind>,
    }

    pub mod value {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Kind {
            #[prost(bool, tag = "1")]
            BoolValue(bool),
            #[prost(sint64, tag = "2")]
            IntValue(i64),
            #[prost(double, tag = "3")]
            FloatValue(f64),
            #[prost(string, tag = "4")]
            StringValue(String),
            #[prost(message, tag = "5")]
            ArrayValue(super::ArrayValue),
            #[prost(message, tag = "6")]
            MapValue(super::MapValue),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ArrayValue {
        #[prost(message, repeated, tag = "1")]
        pub values: Vec<Value>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MapValue {
        #[prost(map = "string, message", tag = "1")]
        pub fields: HashMap<String, Value>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ValueHolder {
        #[prost(enumeration = "ValueType", tag = "1")]
        pub value_type: i32,
        #[prost(message, optional, tag = "2")]
        pub val: Option<Value>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Request {
        #[prost(enumeration = "Op", tag = "1")]
        pub op: i32,
        #[prost(string, tag = "2")]
        pub key: String,
        #[prost(message, optional, tag = "3")]
        pub value: Option<ValueHolder>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Response {
        #[prost(bool, tag = "1")]
        pub success: bool,
        #[prost(string, tag = "2")]
        pub error: String,
        #[prost(message, optional, tag = "3")]
        pub value: Option<ValueHolder>,
    }
}

use crate::types::{Operation, PendingResponse, Request, Response, ValueHolder, ValueType};
use serde_json::{Map, Value};
use wire::value::Kind;

/// Convert a request to its wire form (the reply channel stays local)
pub fn request_to_proto(request: &Request) -> wire::Request {
    let op = match request.op {
        Operation::Read => wire::Op::Read,
        Operation::Write => wire::Op::Write,
        Operation::Delete => wire::Op::Delete,
    };

    wire::Request {
        op: op as i32,
        key: request.key.clone(),
        value: Some(holder_to_proto(&request.value)),
    }
}

/// Build a request with a fresh reply channel from its wire form
pub fn proto_to_request(proto: &wire::Request) -> Option<(Request, PendingResponse)> {
    let op = match wire::Op::try_from(proto.op).ok()? {
        wire::Op::Read => Operation::Read,
        wire::Op::Write => Operation::Write,
        wire::Op::Delete => Operation::Delete,
    };
    let value = match &proto.value {
        Some(holder) => proto_to_holder(holder)?,
        None => ValueHolder::empty(ValueType::None),
    };

    Some(Request::new(op, proto.key.clone(), value))
}

pub fn response_to_proto(response: &Response) -> wire::Response {
    wire::Response {
        success: response.success,
        error: response.error.clone(),
        value: Some(holder_to_proto(&response.value)),
    }
}

/// Convert a wire response, re-deriving success from the error text
pub fn proto_to_response(proto: &wire::Response) -> Option<Response> {
    let value = match &proto.value {
        Some(holder) => proto_to_holder(holder)?,
        None => ValueHolder::empty(ValueType::None),
    };
    Some(Response::from_parts(proto.error.clone(), value))
}

fn holder_to_proto(holder: &ValueHolder) -> wire::ValueHolder {
    wire::ValueHolder {
        value_type: value_type_to_proto(holder.value_type) as i32,
        val: Some(value_to_proto(&holder.val)),
    }
}

fn proto_to_holder(proto: &wire::ValueHolder) -> Option<ValueHolder> {
    let value_type = proto_to_value_type(wire::ValueType::try_from(proto.value_type).ok()?);
    let val = proto.val.as_ref().map_or(Value::Null, proto_to_value);
    Some(ValueHolder::new(value_type, val))
}

fn value_type_to_proto(value_type: ValueType) -> wire::ValueType {
    match value_type {
        ValueType::Bool => wire::ValueType::Bool,
        ValueType::Int => wire::ValueType::Int,
        ValueType::Float => wire::ValueType::Float,
        ValueType::String => wire::ValueType::String,
        ValueType::Array => wire::ValueType::Array,
        ValueType::Map => wire::ValueType::Map,
        ValueType::None => wire::ValueType::None,
    }
}

fn proto_to_value_type(proto: wire::ValueType) -> ValueType {
    match proto {
        wire::ValueType::Bool => ValueType::Bool,
        wire::ValueType::Int => ValueType::Int,
        wire::ValueType::Float => ValueType::Float,
        wire::ValueType::String => ValueType::String,
        wire::ValueType::Array => ValueType::Array,
        wire::ValueType::Map => ValueType::Map,
        wire::ValueType::None => ValueType::None,
    }
}

pub fn value_to_proto(value: &Value) -> wire::Value {
    let kind = match value {
        Value::Null => None,
        Value::Bool(b) => Some(Kind::BoolValue(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Kind::IntValue(i)),
            None => n.as_f64().map(Kind::FloatValue),
        },
        Value::String(s) => Some(Kind::StringValue(s.clone())),
        Value::Array(items) => Some(Kind::ArrayValue(wire::ArrayValue {
            values: items.iter().map(value_to_proto).collect(),
        })),
        Value::Object(map) => Some(Kind::MapValue(wire::MapValue {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), value_to_proto(v)))
                .collect(),
        })),
    };
    wire::Value { kind }
}

pub fn proto_to_value(proto: &wire::Value) -> Value {
    match &proto.kind {
        None => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntValue(i)) => Value::from(*i),
        // NaN and infinities have no JSON form and arrive as null
        Some(Kind::FloatValue(f)) => Value::from(*f),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ArrayValue(array)) => {
            Value::Array(array.values.iter().map(proto_to_value).collect())
        }
        Some(Kind::MapValue(map)) => Value::Object(
            map.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_value(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use serde_json::json;

    #[test]
    fn test_nested_value_keeps_int_and_float_apart() {
        let value = json!({
            "count": 2,
            "ratio": 2.0,
            "tags": ["a", true, null, {"deep": -7}],
        });

        let encoded = value_to_proto(&value).encode_to_vec();
        let decoded = wire::Value::decode(&encoded[..]).unwrap();
        let back = proto_to_value(&decoded);

        assert_eq!(back, value);
        assert_eq!(ValueType::of(&back["count"]), ValueType::Int);
        assert_eq!(ValueType::of(&back["ratio"]), ValueType::Float);
    }

    #[test]
    fn test_request_over_the_wire() {
        let (request, _pending) = Request::write("k", ValueType::Array, json!([1, 2]));
        let bytes = request_to_proto(&request).encode_to_vec();

        let proto = wire::Request::decode(&bytes[..]).unwrap();
        let (decoded, _pending) = proto_to_request(&proto).unwrap();
        assert_eq!(decoded.op, Operation::Write);
        assert_eq!(decoded.key, "k");
        assert_eq!(decoded.value, ValueHolder::new(ValueType::Array, json!([1, 2])));
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let proto = wire::Request {
            op: 42,
            key: "k".to_string(),
            value: None,
        };
        assert!(proto_to_request(&proto).is_none());
    }

    #[test]
    fn test_response_success_rederived() {
        let proto = wire::Response {
            success: true,
            error: "key 'x' does not exist".to_string(),
            value: None,
        };
        let response = proto_to_response(&proto).unwrap();
        assert!(!response.success);
        assert_eq!(response.value, ValueHolder::empty(ValueType::None));
    }
}
