//! Typed access to the fields of a raw JSON object.
//!
//! Every accessor reports failures against the full field path
//! (`highlight_points[1].axis`), so callers can point at the exact input that
//! was rejected. JSON `null` is treated the same as an absent key.

use serde_json::{Map, Value};

use crate::core::error::{Rule, ValidationError};

/// A closed set of string values accepted by a field.
pub trait Choice: Sized + Copy {
    /// Human readable list used in error messages.
    const ALLOWED: &'static str;

    fn parse(value: &str) -> Option<Self>;
}

pub type FieldResult<T> = Result<T, ValidationError>;

pub struct Fields<'a> {
    map: &'a Map<String, Value>,
    prefix: Option<String>,
}

impl<'a> Fields<'a> {
    /// Reads the request body. Its fields are reported without a prefix.
    pub fn root(raw: &'a Value) -> FieldResult<Self> {
        Self::with_prefix(raw, None)
    }

    /// Reads `raw` as an object whose fields are reported under `prefix`.
    pub fn nested(raw: &'a Value, prefix: impl Into<String>) -> FieldResult<Self> {
        Self::with_prefix(raw, Some(prefix.into()))
    }

    fn with_prefix(raw: &'a Value, prefix: Option<String>) -> FieldResult<Self> {
        match raw.as_object() {
            Some(map) => Ok(Self { map, prefix }),
            None => Err(ValidationError::new(
                prefix.unwrap_or_else(|| "body".to_string()),
                Rule::TypeMismatch { expected: "object" },
            )),
        }
    }

    pub fn path(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn mismatch(&self, key: &str, expected: &'static str) -> ValidationError {
        ValidationError::new(self.path(key), Rule::TypeMismatch { expected })
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn opt_str(&self, key: &str) -> FieldResult<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.mismatch(key, "string")),
        }
    }

    pub fn required_str(&self, key: &str) -> FieldResult<String> {
        self.opt_str(key)?
            .ok_or_else(|| ValidationError::new(self.path(key), Rule::Missing))
    }

    pub fn str_or(&self, key: &str, default: &str) -> FieldResult<String> {
        Ok(self.opt_str(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> FieldResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.mismatch(key, "boolean")),
        }
    }

    /// Rejects a string that is empty or only whitespace.
    pub fn non_blank(&self, key: &str, value: String) -> FieldResult<String> {
        if value.trim().is_empty() {
            return Err(ValidationError::new(self.path(key), Rule::Empty));
        }
        Ok(value)
    }

    /// Checks a string already read with [`Fields::opt_str`] against a
    /// closed set, falling back to `default` when it was absent.
    pub fn choice<T: Choice>(&self, key: &str, raw: Option<String>, default: T) -> FieldResult<T> {
        parse_choice(self.path(key), raw, default)
    }

    fn opt_array(&self, key: &str) -> FieldResult<Option<&'a Vec<Value>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(_) => Err(self.mismatch(key, "array")),
        }
    }

    pub fn opt_str_seq(&self, key: &str) -> FieldResult<Option<Vec<String>>> {
        let Some(items) = self.opt_array(key)? else {
            return Ok(None);
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(ValidationError::new(
                    format!("{}[{}]", self.path(key), i),
                    Rule::TypeMismatch { expected: "string" },
                )),
            })
            .collect::<FieldResult<Vec<_>>>()
            .map(Some)
    }

    pub fn str_seq(&self, key: &str) -> FieldResult<Vec<String>> {
        self.opt_str_seq(key)?
            .ok_or_else(|| ValidationError::new(self.path(key), Rule::Missing))
    }

    /// Sequence whose entries may individually be `null`.
    pub fn opt_nullable_str_seq(&self, key: &str) -> FieldResult<Option<Vec<Option<String>>>> {
        let Some(items) = self.opt_array(key)? else {
            return Ok(None);
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Null => Ok(None),
                Value::String(s) => Ok(Some(s.clone())),
                _ => Err(ValidationError::new(
                    format!("{}[{}]", self.path(key), i),
                    Rule::TypeMismatch {
                        expected: "string or null",
                    },
                )),
            })
            .collect::<FieldResult<Vec<_>>>()
            .map(Some)
    }

    pub fn opt_num_seq(&self, key: &str) -> FieldResult<Option<Vec<f64>>> {
        match self.opt_array(key)? {
            None => Ok(None),
            Some(items) => numbers(items, &self.path(key)).map(Some),
        }
    }

    pub fn num_seq(&self, key: &str) -> FieldResult<Vec<f64>> {
        self.opt_num_seq(key)?
            .ok_or_else(|| ValidationError::new(self.path(key), Rule::Missing))
    }

    /// Sequence of nested objects, each visited with its own reader.
    pub fn opt_records<T>(
        &self,
        key: &str,
        mut visit: impl FnMut(Fields<'a>) -> FieldResult<T>,
    ) -> FieldResult<Option<Vec<T>>> {
        let Some(items) = self.opt_array(key)? else {
            return Ok(None);
        };
        let path = self.path(key);
        items
            .iter()
            .enumerate()
            .map(|(i, item)| visit(Fields::nested(item, format!("{}[{}]", path, i))?))
            .collect::<FieldResult<Vec<_>>>()
            .map(Some)
    }

    /// Required object mapping names to number sequences, keeping key order.
    pub fn num_seq_map(&self, key: &str) -> FieldResult<Vec<(String, Vec<f64>)>> {
        let map = match self.get(key) {
            None => return Err(ValidationError::new(self.path(key), Rule::Missing)),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(self.mismatch(key, "object")),
        };
        let path = self.path(key);
        map.iter()
            .map(|(name, series)| {
                let series_path = format!("{}.{}", path, name);
                match series {
                    Value::Array(items) => Ok((name.clone(), numbers(items, &series_path)?)),
                    _ => Err(ValidationError::new(
                        series_path,
                        Rule::TypeMismatch { expected: "array" },
                    )),
                }
            })
            .collect()
    }

    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.get(key)
    }
}

pub fn parse_choice<T: Choice>(field: String, raw: Option<String>, default: T) -> FieldResult<T> {
    match raw {
        None => Ok(default),
        Some(value) => match T::parse(&value) {
            Some(choice) => Ok(choice),
            None => Err(ValidationError::new(
                field,
                Rule::NotInEnum {
                    value,
                    allowed: T::ALLOWED,
                },
            )),
        },
    }
}

fn numbers(items: &[Value], path: &str) -> FieldResult<Vec<f64>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_f64().ok_or_else(|| {
                ValidationError::new(
                    format!("{}[{}]", path, i),
                    Rule::TypeMismatch { expected: "number" },
                )
            })
        })
        .collect()
}
