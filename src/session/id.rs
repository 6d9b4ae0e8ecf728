//! Opaque identifier types.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated session and participant ids.
const ID_LENGTH: usize = 10;

/// Generate a short opaque alphanumeric id.
fn short_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Issue a new unique id.
            pub fn generate() -> Self {
                Self(short_id())
            }

            /// View the raw id string.
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

opaque_id! {
    /// Unique identifier for a session.
    SessionId
}

opaque_id! {
    /// Identifier for a participant, unique within its session.
    ParticipantId
}

opaque_id! {
    /// Identifier for a live transport connection, issued by the
    /// transport front. A participant's connection id changes across
    /// reconnects; the session record tracks the current one.
    ConnectionId
}
