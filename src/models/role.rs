use serde::{Deserialize, Serialize};
use std::fmt;

/// A job slot that may be held by at most one live worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Record,
    Continuous,
    Stream,
    Upload,
    Broadcast,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Record,
        Role::Continuous,
        Role::Stream,
        Role::Upload,
        Role::Broadcast,
    ];

    /// Stable lowercase name, also used for liveness record file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Record => "record",
            Role::Continuous => "continuous",
            Role::Stream => "stream",
            Role::Upload => "upload",
            Role::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
