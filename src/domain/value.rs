use crate::packet::{HttpRequest, Tag, Tags, User};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::entry::SharedError;

/// Value of one log entry field.
///
/// Each variant stands for a capability the value carries: being an error,
/// serializing itself, rendering itself as text, or none of these (`Opaque`).
/// Reference-counted variants keep the entry cheap to clone.
#[derive(Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Strings(Vec<String>),
    /// Already structured data.
    Json(Value),
    /// Calendar time, serialized natively by the wire encoder.
    Timestamp(DateTime<Utc>),
    Error(SharedError),
    Display(Arc<dyn fmt::Display + Send + Sync>),
    Request(HttpRequest),
    Tags(Tags),
    User(User),
    /// Value with no recognized capability; only its `Debug` form is known.
    Opaque(Arc<dyn fmt::Debug + Send + Sync>),
}

impl FieldValue {
    pub fn error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FieldValue::Error(Arc::new(err))
    }

    pub fn display<D>(value: D) -> Self
    where
        D: fmt::Display + Send + Sync + 'static,
    {
        FieldValue::Display(Arc::new(value))
    }

    pub fn opaque<D>(value: D) -> Self
    where
        D: fmt::Debug + Send + Sync + 'static,
    {
        FieldValue::Opaque(Arc::new(value))
    }

    /// Captures any serde-serializable value as structured data.
    pub fn serialized<T: Serialize + ?Sized>(value: &T) -> Self {
        serde_json::to_value(value)
            .map(FieldValue::Json)
            .unwrap_or(FieldValue::Null)
    }

    pub fn tags<I, K, V>(tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        FieldValue::Tags(tags.into_iter().map(|(k, v)| Tag::new(k, v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::I64(_) => "i64",
            FieldValue::U64(_) => "u64",
            FieldValue::F64(_) => "f64",
            FieldValue::String(_) => "string",
            FieldValue::Strings(_) => "strings",
            FieldValue::Json(_) => "json",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Error(_) => "error",
            FieldValue::Display(_) => "display",
            FieldValue::Request(_) => "request",
            FieldValue::Tags(_) => "tags",
            FieldValue::User(_) => "user",
            FieldValue::Opaque(_) => "opaque",
        }
    }

    /// Wire encoding. Never fails; unencodable values become `null` and
    /// opaque values their `Debug` rendering.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::I64(n) => Value::from(*n),
            FieldValue::U64(n) => Value::from(*n),
            FieldValue::F64(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Strings(v) => Value::from(v.clone()),
            FieldValue::Json(v) => v.clone(),
            FieldValue::Timestamp(t) => serde_json::to_value(t).unwrap_or(Value::Null),
            FieldValue::Error(e) => Value::String(e.to_string()),
            FieldValue::Display(d) => Value::String(d.to_string()),
            FieldValue::Request(r) => serde_json::to_value(r).unwrap_or(Value::Null),
            FieldValue::Tags(t) => serde_json::to_value(t).unwrap_or(Value::Null),
            FieldValue::User(u) => serde_json::to_value(u).unwrap_or(Value::Null),
            FieldValue::Opaque(o) => Value::String(format!("{o:?}")),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            FieldValue::I64(n) => f.debug_tuple("I64").field(n).finish(),
            FieldValue::U64(n) => f.debug_tuple("U64").field(n).finish(),
            FieldValue::F64(n) => f.debug_tuple("F64").field(n).finish(),
            FieldValue::String(s) => f.debug_tuple("String").field(s).finish(),
            FieldValue::Strings(v) => f.debug_tuple("Strings").field(v).finish(),
            FieldValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            FieldValue::Timestamp(t) => f.debug_tuple("Timestamp").field(t).finish(),
            FieldValue::Error(e) => f.debug_tuple("Error").field(&e.to_string()).finish(),
            FieldValue::Display(d) => f.debug_tuple("Display").field(&d.to_string()).finish(),
            FieldValue::Request(r) => f.debug_tuple("Request").field(r).finish(),
            FieldValue::Tags(t) => f.debug_tuple("Tags").field(t).finish(),
            FieldValue::User(u) => f.debug_tuple("User").field(u).finish(),
            FieldValue::Opaque(o) => f.debug_tuple("Opaque").field(o).finish(),
        }
    }
}

impl PartialEq for FieldValue {
    /// Data variants compare by value, capability variants by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::I64(a), FieldValue::I64(b)) => a == b,
            (FieldValue::U64(a), FieldValue::U64(b)) => a == b,
            (FieldValue::F64(a), FieldValue::F64(b)) => a == b,
            (FieldValue::String(a), FieldValue::String(b)) => a == b,
            (FieldValue::Strings(a), FieldValue::Strings(b)) => a == b,
            (FieldValue::Json(a), FieldValue::Json(b)) => a == b,
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a == b,
            (FieldValue::Request(a), FieldValue::Request(b)) => a == b,
            (FieldValue::Tags(a), FieldValue::Tags(b)) => a == b,
            (FieldValue::User(a), FieldValue::User(b)) => a == b,
            (FieldValue::Error(a), FieldValue::Error(b)) => Arc::ptr_eq(a, b),
            (FieldValue::Display(a), FieldValue::Display(b)) => Arc::ptr_eq(a, b),
            (FieldValue::Opaque(a), FieldValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value as $cast)
                }
            }
        )*
    };
}

impl_from!(
    i8 => I64 as i64,
    i16 => I64 as i64,
    i32 => I64 as i64,
    i64 => I64 as i64,
    u8 => U64 as u64,
    u16 => U64 as u64,
    u32 => U64 as u64,
    u64 => U64 as u64,
    usize => U64 as u64,
    f32 => F64 as f64,
    f64 => F64 as f64,
);

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::Strings(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::Strings(value.into_iter().map(str::to_string).collect())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<HttpRequest> for FieldValue {
    fn from(value: HttpRequest) -> Self {
        FieldValue::Request(value)
    }
}

impl<B> From<&http::Request<B>> for FieldValue {
    fn from(value: &http::Request<B>) -> Self {
        FieldValue::Request(HttpRequest::from(value))
    }
}

impl From<User> for FieldValue {
    fn from(value: User) -> Self {
        FieldValue::User(value)
    }
}

impl From<Tags> for FieldValue {
    fn from(value: Tags) -> Self {
        FieldValue::Tags(value)
    }
}

impl From<SharedError> for FieldValue {
    fn from(value: SharedError) -> Self {
        FieldValue::Error(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}
