//! Identifier value objects
//!
//! Entities reference each other only through these ids; nothing holds a
//! pointer to another entity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow the id as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Value object: Process instance ID
    ProcessInstanceId
);

string_id!(
    /// Value object: Process model ID
    ProcessModelId
);

string_id!(
    /// Value object: Correlation ID
    CorrelationId
);

string_id!(
    /// Value object: Flow node ID (definition-level)
    FlowNodeId
);

string_id!(
    /// Value object: Flow node instance ID
    FlowNodeInstanceId
);

string_id!(
    /// Value object: External task ID
    ExternalTaskId
);
