use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;

/// The payload carried through a process instance
///
/// Wraps a JSON value. Snapshots of it are written to the token history
/// on every enter and exit of a flow node.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TokenPayload {
    /// The inner JSON value
    pub value: serde_json::Value,
}

impl TokenPayload {
    /// Create a new payload from a JSON value
    #[inline]
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Create a null payload
    #[inline]
    pub fn null() -> Self {
        Self {
            value: serde_json::Value::Null,
        }
    }

    /// Get the inner JSON value
    #[inline]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Take ownership of the inner JSON value
    #[inline]
    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Check if the payload is null
    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Try to convert the payload to a specific type
    pub fn to<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.value.clone())
    }

    /// Merge a result into this payload.
    ///
    /// Two objects are merged key by key with the result winning. Any
    /// other combination replaces the current value, except a null
    /// result which leaves the payload untouched.
    pub fn merge(&mut self, result: &TokenPayload) {
        match (&mut self.value, &result.value) {
            (_, serde_json::Value::Null) => {}
            (serde_json::Value::Object(current), serde_json::Value::Object(incoming)) => {
                for (key, value) in incoming {
                    current.insert(key.clone(), value.clone());
                }
            }
            (current, incoming) => *current = incoming.clone(),
        }
    }
}

impl From<serde_json::Value> for TokenPayload {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

/// Offset/limit window applied to query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Number of items to skip
    #[serde(default)]
    pub offset: usize,

    /// Maximum number of items to return; `None` returns the remainder
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Pagination {
    /// Create a new pagination window
    pub fn new(offset: usize, limit: Option<usize>) -> Self {
        Self { offset, limit }
    }

    /// A window covering every item
    pub fn all() -> Self {
        Self::default()
    }

    /// Apply the window, returning `items[offset..min(offset + limit, len)]`
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let take = self.limit.unwrap_or(usize::MAX);
        items.into_iter().skip(self.offset).take(take).collect()
    }
}

/// One page of a query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items inside the requested window
    pub items: Vec<T>,

    /// Number of items before pagination was applied
    pub total_count: usize,
}

impl<T> Page<T> {
    /// Paginate a full result set
    pub fn paginate(items: Vec<T>, pagination: Pagination) -> Self {
        let total_count = items.len();
        Self {
            items: pagination.apply(items),
            total_count,
        }
    }

    /// An empty page
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
        }
    }
}

/// Source of the current time
pub trait Clock: Debug + Send + Sync {
    /// The current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
