use serde::{Deserialize, Serialize};
use std::fmt;

/// A person attached to plan or ledger data: planner, committer, or project
/// creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Identity {
    /// Renders the conventional `Name <email>` form used in id info blocks.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::Identity;

    #[test]
    fn display_uses_angle_bracket_form() {
        let id = Identity::new("Ada Lovelace", "ada@example.com");
        assert_eq!(id.to_string(), "Ada Lovelace <ada@example.com>");
    }
}
