use std::fmt;

/// Errors surfaced by ledger operations.
///
/// Validation failures (`RegistrationConflict`, `InvalidArgument`) are
/// raised eagerly with the offending values in the message. Everything the
/// backend reports passes through unchanged as `Backend`; the ledger never
/// retries. The one tolerance (treating an unprovisioned ledger schema as
/// "no value" in the earliest/latest queries) is handled by an explicit
/// schema probe, not by matching backend error text.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Project name or URI clashes with an existing registration.
    #[error("cannot register project \"{project}\": {reason}")]
    RegistrationConflict { project: String, reason: String },

    /// An unrecognized search option or an invalid option value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A failure surfaced by the underlying store.
    #[error(transparent)]
    Backend(#[from] rusqlite::Error),

    /// A stored timestamp could not be parsed back into a structured value.
    #[error("malformed timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}

/// Renders an optional URI for conflict messages, spelling out absence.
pub(crate) fn uri_or_none(uri: Option<&str>) -> UriDisplay<'_> {
    UriDisplay(uri)
}

pub(crate) struct UriDisplay<'a>(Option<&'a str>);

impl fmt::Display for UriDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(uri) => write!(f, "URI {uri}"),
            None => f.write_str("no URI"),
        }
    }
}
