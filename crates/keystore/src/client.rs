use crate::error::ClientError;
use crate::types::{PendingResponse, Request, Response, ValueType};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Call-and-wait façade over a request channel
///
/// Whatever drains the channel decides where requests go: the dispatcher
/// itself, or the routing task of one of the transport clients. Each call
/// sends one request and suspends until its private reply arrives.
#[derive(Debug, Clone)]
pub struct Client {
    requests: mpsc::Sender<Request>,
}

impl Client {
    pub fn new(requests: mpsc::Sender<Request>) -> Self {
        Self { requests }
    }

    async fn call(&self, (request, pending): (Request, PendingResponse)) -> Result<Response> {
        self.requests
            .send(request)
            .await
            .map_err(|_| ClientError::Closed)?;
        let response = pending.await.map_err(|_| ClientError::Closed)?;
        if !response.error.is_empty() {
            return Err(ClientError::Rejected(response.error));
        }
        Ok(response)
    }

    async fn read(&self, key: &str, value_type: ValueType) -> Result<Value> {
        let response = self.call(Request::read(key, value_type)).await?;
        let value = response.value.val;
        // Transports that only speak untyped reads hand back whatever is
        // stored, so the declared type is checked again here.
        if !value_type.matches(&value) {
            return Err(unexpected(key, value_type));
        }
        Ok(value)
    }

    async fn write(&self, key: &str, value_type: ValueType, value: Value) -> Result<()> {
        self.call(Request::write(key, value_type, value)).await?;
        Ok(())
    }

    /// Whatever value is stored under `key`
    pub async fn get(&self, key: &str) -> Result<Value> {
        self.read(key, ValueType::None).await
    }

    pub async fn get_bool(&self, key: &str) -> Result<bool> {
        self.read(key, ValueType::Bool)
            .await?
            .as_bool()
            .ok_or_else(|| unexpected(key, ValueType::Bool))
    }

    pub async fn get_int(&self, key: &str) -> Result<i64> {
        self.read(key, ValueType::Int)
            .await?
            .as_i64()
            .ok_or_else(|| unexpected(key, ValueType::Int))
    }

    pub async fn get_float(&self, key: &str) -> Result<f64> {
        self.read(key, ValueType::Float)
            .await?
            .as_f64()
            .ok_or_else(|| unexpected(key, ValueType::Float))
    }

    pub async fn get_string(&self, key: &str) -> Result<String> {
        match self.read(key, ValueType::String).await? {
            Value::String(s) => Ok(s),
            _ => Err(unexpected(key, ValueType::String)),
        }
    }

    pub async fn get_array(&self, key: &str) -> Result<Vec<Value>> {
        match self.read(key, ValueType::Array).await? {
            Value::Array(items) => Ok(items),
            _ => Err(unexpected(key, ValueType::Array)),
        }
    }

    pub async fn get_map(&self, key: &str) -> Result<Map<String, Value>> {
        match self.read(key, ValueType::Map).await? {
            Value::Object(map) => Ok(map),
            _ => Err(unexpected(key, ValueType::Map)),
        }
    }

    /// Decode a value stored by [`Client::set_value`]
    pub async fn get_value_type<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let raw = self.get_string(key).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Store any value without a type check
    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.write(key, ValueType::None, value).await
    }

    pub async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.write(key, ValueType::Bool, Value::Bool(value)).await
    }

    pub async fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.write(key, ValueType::Int, Value::from(value)).await
    }

    /// Non-finite floats have no JSON form and are rejected by the store
    pub async fn set_float(&self, key: &str, value: f64) -> Result<()> {
        self.write(key, ValueType::Float, Value::from(value)).await
    }

    pub async fn set_string(&self, key: &str, value: impl Into<String>) -> Result<()> {
        self.write(key, ValueType::String, Value::String(value.into()))
            .await
    }

    pub async fn set_array(&self, key: &str, value: Vec<Value>) -> Result<()> {
        self.write(key, ValueType::Array, Value::Array(value)).await
    }

    pub async fn set_map(&self, key: &str, value: Map<String, Value>) -> Result<()> {
        self.write(key, ValueType::Map, Value::Object(value)).await
    }

    /// Store an arbitrary serializable value as JSON text in a STRING slot
    pub async fn set_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.set_string(key, encoded).await
    }

    /// Remove `key`; succeeds whether or not it existed
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.call(Request::delete(key)).await?;
        Ok(())
    }
}

fn unexpected(key: &str, expected: ValueType) -> ClientError {
    ClientError::UnexpectedValue {
        key: key.to_string(),
        expected,
    }
}
