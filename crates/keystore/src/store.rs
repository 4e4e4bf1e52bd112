use crate::error::StoreError;
use crate::types::ValueType;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, StoreError>;

/// In-memory key/value map with optional file persistence
///
/// Not synchronized: the dispatcher owns the store and is the only caller
/// of the mutating methods.
#[derive(Debug, Default)]
pub struct Store {
    path: Option<PathBuf>,
    values: HashMap<String, Value>,
}

impl Store {
    /// An empty store with no backing file
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store that loads from and saves to `path`
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            values: HashMap::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Change where [`Store::load`] and [`Store::save`] go; `None` disables persistence
    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    /// Replace the map with the contents of the backing file
    ///
    /// No-op without a path. A missing file leaves the store empty.
    pub fn load(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        info!("Loading keystore from {:?}", path);

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No file at {:?}, starting empty", path);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        self.values = serde_json::from_slice(&data)?;
        debug!("Loaded {} keys", self.values.len());
        Ok(())
    }

    /// Write the whole map to the backing file. No-op without a path.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        info!("Saving keystore to {:?}", path);

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut file, &self.values)?;
        file.flush()?;
        file.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Result<&Value> {
        self.values.get(key).ok_or_else(|| StoreError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Get a value only if its concrete type is `value_type`
    ///
    /// `ValueType::None` behaves like [`Store::get`].
    pub fn get_typed(&self, key: &str, value_type: ValueType) -> Result<&Value> {
        let value = self.get(key)?;
        if value_type.matches(value) {
            Ok(value)
        } else {
            Err(type_mismatch(key))
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get_typed(key, ValueType::Bool)?
            .as_bool()
            .ok_or_else(|| type_mismatch(key))
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get_typed(key, ValueType::Int)?
            .as_i64()
            .ok_or_else(|| type_mismatch(key))
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.get_typed(key, ValueType::Float)?
            .as_f64()
            .ok_or_else(|| type_mismatch(key))
    }

    pub fn get_string(&self, key: &str) -> Result<&str> {
        self.get_typed(key, ValueType::String)?
            .as_str()
            .ok_or_else(|| type_mismatch(key))
    }

    pub fn get_array(&self, key: &str) -> Result<&[Value]> {
        self.get_typed(key, ValueType::Array)?
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| type_mismatch(key))
    }

    pub fn get_map(&self, key: &str) -> Result<&Map<String, Value>> {
        self.get_typed(key, ValueType::Map)?
            .as_object()
            .ok_or_else(|| type_mismatch(key))
    }

    /// Store any value, replacing what was there
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Store `value` only if its concrete type is `value_type`
    ///
    /// On mismatch the existing entry is left untouched.
    pub fn set_typed(&mut self, key: &str, value_type: ValueType, value: Value) -> Result<()> {
        if !value_type.matches(&value) {
            return Err(type_mismatch(key));
        }
        self.set(key, value);
        Ok(())
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, Value::Bool(value));
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, Value::from(value));
    }

    /// Non-finite floats have no JSON form and are stored as null
    pub fn set_float(&mut self, key: impl Into<String>, value: f64) {
        self.set(key, Value::from(value));
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, Value::String(value.into()));
    }

    pub fn set_array(&mut self, key: impl Into<String>, value: Vec<Value>) {
        self.set(key, Value::Array(value));
    }

    pub fn set_map(&mut self, key: impl Into<String>, value: Map<String, Value>) {
        self.set(key, Value::Object(value));
    }

    /// Remove a key. Absent keys are ignored.
    pub fn delete(&mut self, key: &str) {
        self.values.remove(key);
    }
}

fn type_mismatch(key: &str) -> StoreError {
    StoreError::TypeMismatch {
        key: key.to_string(),
    }
}
