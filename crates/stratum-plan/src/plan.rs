use serde::{Deserialize, Serialize};

/// The identity of the current plan: its project name and optional URI.
///
/// The ledger registers this pair in the `projects` table before the first
/// deploy and uses the project name as the default scope for state queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub project: String,
    pub uri: Option<String>,
}

impl Plan {
    #[must_use]
    pub fn new(project: impl Into<String>, uri: Option<String>) -> Self {
        Self {
            project: project.into(),
            uri,
        }
    }
}
