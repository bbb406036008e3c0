//! Filtered, sorted, paginated scans over the event log.
//!
//! [`EventSearch`] is the typed form: named optional fields with explicit
//! defaults, combined with AND semantics. [`EventSearch::from_options`] is
//! the loosely-typed entry point used by callers that collect options from
//! a command line or API payload; it validates exhaustively and rejects
//! unrecognized keys by name.

use rusqlite::ToSql;
use serde_json::{Map, Value};

use crate::dialect::Dialect;
use crate::error::RegistryError;
use crate::event::EventKind;

/// Scan direction over `committed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Asc,
    /// Newest first; the default for history listings.
    #[default]
    Desc,
}

impl Direction {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Parse a direction, accepting any case-insensitive extension of
    /// `ASC`/`DESC` (`"asc"`, `"Descending"`).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] naming the input when it
    /// starts with neither prefix.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let upper = input.trim().to_ascii_uppercase();
        if upper.starts_with("ASC") {
            Ok(Self::Asc)
        } else if upper.starts_with("DESC") {
            Ok(Self::Desc)
        } else {
            Err(RegistryError::InvalidArgument(format!(
                "search direction \"{input}\" must be ASC or DESC"
            )))
        }
    }
}

/// Filter, sort, and pagination options for [`crate::Registry::search_events`].
///
/// Absent fields mean "no constraint". The pattern fields are matched with
/// the dialect's native pattern operator against the corresponding text
/// column; `event` is set-membership over event kinds.
#[derive(Debug, Clone, Default)]
pub struct EventSearch {
    pub committer: Option<String>,
    pub planner: Option<String>,
    /// Pattern over the change display name.
    pub change: Option<String>,
    pub project: Option<String>,
    pub event: Option<Vec<EventKind>>,
    pub direction: Direction,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Option keys [`EventSearch::from_options`] recognizes, sorted.
const RECOGNIZED: &[&str] = &[
    "change",
    "committer",
    "direction",
    "event",
    "limit",
    "offset",
    "planner",
    "project",
];

impl EventSearch {
    /// Build a search from a loosely-typed option map.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] listing any unrecognized
    /// keys (sorted, comma-joined), and for values of the wrong shape: a
    /// non-string pattern, an unknown event kind, a direction that is not
    /// ASC/DESC, or a non-positive limit/offset.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self, RegistryError> {
        let mut unknown: Vec<&str> = options
            .keys()
            .map(String::as_str)
            .filter(|key| !RECOGNIZED.contains(key))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(RegistryError::InvalidArgument(format!(
                "unknown search parameters: {}",
                unknown.join(", ")
            )));
        }

        let mut search = Self::default();
        search.committer = pattern(options, "committer")?;
        search.planner = pattern(options, "planner")?;
        search.change = pattern(options, "change")?;
        search.project = pattern(options, "project")?;

        if let Some(value) = options.get("direction") {
            let raw = value.as_str().ok_or_else(|| {
                RegistryError::InvalidArgument(format!(
                    "search parameter \"direction\" must be a string, got {value}"
                ))
            })?;
            search.direction = Direction::parse(raw)?;
        }

        if let Some(value) = options.get("event") {
            let raw = value.as_array().ok_or_else(|| {
                RegistryError::InvalidArgument(format!(
                    "search parameter \"event\" must be an array of event kinds, got {value}"
                ))
            })?;
            let mut kinds = Vec::with_capacity(raw.len());
            for entry in raw {
                let text = entry.as_str().ok_or_else(|| {
                    RegistryError::InvalidArgument(format!(
                        "search parameter \"event\" entries must be strings, got {entry}"
                    ))
                })?;
                let kind = text
                    .parse::<EventKind>()
                    .map_err(|err| RegistryError::InvalidArgument(err.to_string()))?;
                kinds.push(kind);
            }
            search.event = Some(kinds);
        }

        search.limit = positive(options, "limit")?;
        search.offset = positive(options, "offset")?;
        Ok(search)
    }

    /// Render the scan as SQL plus bound parameters.
    ///
    /// Filters AND-combine; ordering is by `committed_at` in the requested
    /// direction; limit/offset are appended last, in that order.
    pub(crate) fn build<D: Dialect>(&self, dialect: &D) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = format!(
            "SELECT e.event, e.change_id, e.change, e.project, e.note, \
             e.requires, e.conflicts, e.tags, \
             {committed}, e.committer_name, e.committer_email, \
             {planned}, e.planner_name, e.planner_email \
             FROM events e",
            committed = dialect.timestamp_expr("e.committed_at"),
            planned = dialect.timestamp_expr("e.planned_at"),
        );

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        let op = dialect.regexp_op();

        let patterns = [
            ("e.committer_name", &self.committer),
            ("e.planner_name", &self.planner),
            ("e.change", &self.change),
            ("e.project", &self.project),
        ];
        for (column, value) in patterns {
            if let Some(pattern) = value {
                params.push(Box::new(pattern.clone()));
                conditions.push(format!("{column} {op} ?{}", params.len()));
            }
        }

        if let Some(kinds) = &self.event {
            if kinds.is_empty() {
                // Membership in the empty set matches nothing.
                conditions.push("1 = 0".to_string());
            } else {
                let mut placeholders = Vec::with_capacity(kinds.len());
                for kind in kinds {
                    params.push(Box::new(kind.as_str()));
                    placeholders.push(format!("?{}", params.len()));
                }
                conditions.push(format!("e.event IN ({})", placeholders.join(", ")));
            }
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY e.committed_at ");
        sql.push_str(self.direction.as_sql());

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                params.push(Box::new(limit));
                sql.push_str(&format!(" LIMIT ?{}", params.len()));
                params.push(Box::new(offset));
                sql.push_str(&format!(" OFFSET ?{}", params.len()));
            }
            (Some(limit), None) => {
                params.push(Box::new(limit));
                sql.push_str(&format!(" LIMIT ?{}", params.len()));
            }
            (None, Some(offset)) => {
                params.push(Box::new(offset));
                sql.push_str(&format!(" LIMIT -1 OFFSET ?{}", params.len()));
            }
            (None, None) => {}
        }

        (sql, params)
    }
}

fn pattern(options: &Map<String, Value>, key: &str) -> Result<Option<String>, RegistryError> {
    match options.get(key) {
        None => Ok(None),
        Some(value) => value.as_str().map(str::to_string).map(Some).ok_or_else(|| {
            RegistryError::InvalidArgument(format!(
                "search parameter \"{key}\" must be a string pattern, got {value}"
            ))
        }),
    }
}

fn positive(options: &Map<String, Value>, key: &str) -> Result<Option<u32>, RegistryError> {
    match options.get(key) {
        None => Ok(None),
        Some(value) => {
            let parsed = value
                .as_u64()
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok());
            parsed.map(Some).ok_or_else(|| {
                RegistryError::InvalidArgument(format!(
                    "search parameter \"{key}\" must be a positive integer, got {value}"
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, EventSearch};
    use crate::dialect::Dialect;
    use crate::error::RegistryError;
    use crate::event::EventKind;
    use chrono::{DateTime, Utc};
    use serde_json::{Map, Value, json};

    struct TestDialect;

    impl Dialect for TestDialect {
        fn timestamp_expr(&self, column: &str) -> String {
            column.to_string()
        }

        fn format_timestamp(&self, value: &DateTime<Utc>) -> String {
            value.to_rfc3339()
        }

        fn parse_timestamp(&self, text: &str) -> Result<DateTime<Utc>, RegistryError> {
            DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|source| RegistryError::Timestamp {
                    value: text.to_string(),
                    source,
                })
        }

        fn regexp_op(&self) -> &'static str {
            "REGEXP"
        }

        fn ledger_exists(&self, _conn: &rusqlite::Connection) -> Result<bool, RegistryError> {
            Ok(true)
        }
    }

    fn options(value: Value) -> Map<String, Value> {
        value.as_object().expect("object literal").clone()
    }

    #[test]
    fn direction_accepts_case_insensitive_prefix_extensions() {
        assert_eq!(Direction::parse("asc").unwrap(), Direction::Asc);
        assert_eq!(Direction::parse("ASCENDING").unwrap(), Direction::Asc);
        assert_eq!(Direction::parse("Desc").unwrap(), Direction::Desc);
        assert_eq!(Direction::parse("descending").unwrap(), Direction::Desc);
    }

    #[test]
    fn direction_rejects_anything_else() {
        for bad in ["sideways", "", "dsc", "as"] {
            let err = Direction::parse(bad).unwrap_err();
            assert!(
                matches!(err, RegistryError::InvalidArgument(_)),
                "expected InvalidArgument for {bad:?}"
            );
        }
        let err = Direction::parse("sideways").unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn from_options_rejects_unknown_keys_sorted() {
        let opts = options(json!({"foo": 1, "bar": 2, "limit": 10}));
        let err = EventSearch::from_options(&opts).unwrap_err();
        assert!(
            err.to_string().contains("unknown search parameters: bar, foo"),
            "got: {err}"
        );
    }

    #[test]
    fn from_options_parses_every_recognized_key() {
        let opts = options(json!({
            "committer": "^ada",
            "planner": "lovelace$",
            "change": "widgets",
            "project": "flipr",
            "event": ["deploy", "fail"],
            "direction": "asc",
            "limit": 10,
            "offset": 20,
        }));
        let search = EventSearch::from_options(&opts).expect("valid options");
        assert_eq!(search.committer.as_deref(), Some("^ada"));
        assert_eq!(search.planner.as_deref(), Some("lovelace$"));
        assert_eq!(search.change.as_deref(), Some("widgets"));
        assert_eq!(search.project.as_deref(), Some("flipr"));
        assert_eq!(
            search.event,
            Some(vec![EventKind::Deploy, EventKind::Fail])
        );
        assert_eq!(search.direction, Direction::Asc);
        assert_eq!(search.limit, Some(10));
        assert_eq!(search.offset, Some(20));
    }

    #[test]
    fn from_options_rejects_bad_event_kind() {
        let opts = options(json!({"event": ["deploy", "redeploy"]}));
        let err = EventSearch::from_options(&opts).unwrap_err();
        assert!(err.to_string().contains("redeploy"));
    }

    #[test]
    fn from_options_rejects_non_positive_limit() {
        for bad in [json!({"limit": 0}), json!({"limit": -3}), json!({"offset": "ten"})] {
            let err = EventSearch::from_options(&options(bad)).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidArgument(_)));
        }
    }

    #[test]
    fn build_combines_filters_with_and() {
        let search = EventSearch {
            committer: Some("^ada".into()),
            project: Some("flipr".into()),
            event: Some(vec![EventKind::Deploy]),
            ..Default::default()
        };
        let (sql, params) = search.build(&TestDialect);
        assert!(sql.contains("e.committer_name REGEXP ?1"));
        assert!(sql.contains("e.project REGEXP ?2"));
        assert!(sql.contains("e.event IN (?3)"));
        assert!(sql.contains(" AND "));
        assert!(sql.ends_with("ORDER BY e.committed_at DESC"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn build_appends_limit_then_offset() {
        let search = EventSearch {
            limit: Some(5),
            offset: Some(10),
            direction: Direction::Asc,
            ..Default::default()
        };
        let (sql, params) = search.build(&TestDialect);
        assert!(sql.ends_with("ORDER BY e.committed_at ASC LIMIT ?1 OFFSET ?2"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn build_offset_without_limit_scans_to_the_end() {
        let search = EventSearch {
            offset: Some(10),
            ..Default::default()
        };
        let (sql, _) = search.build(&TestDialect);
        assert!(sql.ends_with("LIMIT -1 OFFSET ?1"));
    }

    #[test]
    fn build_empty_event_set_matches_nothing() {
        let search = EventSearch {
            event: Some(Vec::new()),
            ..Default::default()
        };
        let (sql, params) = search.build(&TestDialect);
        assert!(sql.contains("WHERE 1 = 0"));
        assert!(params.is_empty());
    }
}
