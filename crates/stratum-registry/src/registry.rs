//! The ledger store: registration, deploy/revert/fail recording, and state
//! queries over the five ledger tables.
//!
//! A [`Registry`] is bound to one connection, one dialect, the current
//! plan's project/URI, and the operator identity that commits mutations.
//! Deploy and revert must run inside a caller-managed [`crate::Txn`]; read
//! paths run without one.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, ToSql, params, params_from_iter};
use stratum_plan::{Change, DependencyKind, Identity, Plan};

use crate::cursor::Cursor;
use crate::dialect::Dialect;
use crate::error::{RegistryError, uri_or_none};
use crate::event::EventKind;
use crate::record::{ChangeRow, DeployedState, EventRecord, RequiringChange, TagRow};
use crate::search::EventSearch;

/// Backend-agnostic ledger store over a single connection.
pub struct Registry<'conn, D> {
    conn: &'conn Connection,
    dialect: D,
    project: String,
    uri: Option<String>,
    operator: Identity,
}

impl<'conn, D: Dialect> Registry<'conn, D> {
    /// Bind a registry to `conn` for the given plan, committing as
    /// `operator`.
    pub fn new(conn: &'conn Connection, dialect: D, plan: &Plan, operator: Identity) -> Self {
        Self {
            conn,
            dialect,
            project: plan.project.clone(),
            uri: plan.uri.clone(),
            operator,
        }
    }

    /// The plan project this registry defaults to.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    fn project_or<'s>(&'s self, project: Option<&'s str>) -> &'s str {
        project.unwrap_or(&self.project)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// All registered project names, lexicographically ordered.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn registered_projects(&self) -> Result<Vec<String>, RegistryError> {
        let mut stmt = self
            .conn
            .prepare("SELECT project FROM projects ORDER BY project")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<String>, _>>().map_err(Into::into)
    }

    /// Register the current plan's project, idempotently.
    ///
    /// Re-registering the same project name with the same URI (including
    /// both absent) is a no-op. A URI mismatch for an existing name, or a
    /// URI already claimed by a different project, is a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RegistrationConflict`] naming both URIs (or
    /// their absence) on a clash; otherwise propagates backend errors.
    pub fn register_project(&self) -> Result<(), RegistryError> {
        let existing: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT uri FROM projects WHERE project = ?1",
                params![self.project],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(uri) if uri == self.uri => return Ok(()),
            Some(uri) => {
                return Err(RegistryError::RegistrationConflict {
                    project: self.project.clone(),
                    reason: format!(
                        "already registered with {}, cannot register with {}",
                        uri_or_none(uri.as_deref()),
                        uri_or_none(self.uri.as_deref()),
                    ),
                });
            }
            None => {}
        }

        if let Some(uri) = &self.uri {
            let owner: Option<String> = self
                .conn
                .query_row(
                    "SELECT project FROM projects WHERE uri = ?1",
                    params![uri],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(owner) = owner {
                return Err(RegistryError::RegistrationConflict {
                    project: self.project.clone(),
                    reason: format!("URI {uri} is already registered by project \"{owner}\""),
                });
            }
        }

        let created_at = self.dialect.format_timestamp(&Utc::now());
        self.conn.execute(
            "INSERT INTO projects (project, uri, created_at, creator_name, creator_email) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.project,
                self.uri,
                created_at,
                self.operator.name,
                self.operator.email
            ],
        )?;
        tracing::debug!(project = %self.project, "registered project");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deploy / revert / fail
    // -----------------------------------------------------------------------

    /// Record a successful deploy: the change row, its dependency and tag
    /// rows, and a `deploy` event.
    ///
    /// Must run inside a caller-managed [`crate::Txn`] so the four writes
    /// are all-or-nothing.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; on error the caller's rollback leaves the
    /// ledger untouched by this call.
    pub fn log_deploy_change(&self, change: &Change) -> Result<(), RegistryError> {
        let change_id = change.id();
        let committed_at = self.dialect.format_timestamp(&Utc::now());
        let planned_at = self.dialect.format_timestamp(&change.planned_at);

        self.conn.execute(
            "INSERT INTO changes (change_id, change, project, note, committed_at, \
             committer_name, committer_email, planned_at, planner_name, planner_email) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                change_id,
                change.name,
                change.project,
                change.note,
                committed_at,
                self.operator.name,
                self.operator.email,
                planned_at,
                change.planner.name,
                change.planner.email
            ],
        )?;

        if !change.dependencies.is_empty() {
            let mut stmt = self.conn.prepare(
                "INSERT INTO dependencies (change_id, type, dependency, dependency_id) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for dep in &change.dependencies {
                stmt.execute(params![change_id, dep.kind.as_str(), dep.spec, dep.resolved_id])?;
            }
        }

        if !change.tags.is_empty() {
            let mut stmt = self.conn.prepare(
                "INSERT INTO tags (tag_id, tag, project, change_id, note, committed_at, \
                 committer_name, committer_email, planned_at, planner_name, planner_email) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for tag in &change.tags {
                // A fresh timestamp per tag keeps tag commit order well
                // defined within the change.
                let tag_committed_at = self.dialect.format_timestamp(&Utc::now());
                stmt.execute(params![
                    tag.id(&change.project),
                    tag.name,
                    change.project,
                    change_id,
                    tag.note,
                    tag_committed_at,
                    self.operator.name,
                    self.operator.email,
                    self.dialect.format_timestamp(&tag.planned_at),
                    tag.planner.name,
                    tag.planner.email
                ])?;
            }
        }

        // Event content is computed fresh from the change object rather
        // than reusing the insert batches above, so the audit row does not
        // depend on projection row layout.
        self.log_event(
            EventKind::Deploy,
            change,
            &join_comma(change.tag_names()),
            &join_comma(change.dependency_specs(DependencyKind::Require)),
            &join_comma(change.dependency_specs(DependencyKind::Conflict)),
        )
    }

    /// Record a revert: capture tag and dependency text from the live rows,
    /// delete the projection rows, then append a `revert` event carrying
    /// the captured text.
    ///
    /// The capture happens before deletion because the audit event must
    /// preserve what was removed after the source rows are gone.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; run inside a caller-managed [`crate::Txn`].
    pub fn log_revert_change(&self, change: &Change) -> Result<(), RegistryError> {
        let change_id = change.id();

        let tags = self.collect_joined(
            "SELECT tag FROM tags WHERE change_id = ?1 ORDER BY committed_at",
            &change_id,
        )?;
        self.conn
            .execute("DELETE FROM tags WHERE change_id = ?1", params![change_id])?;

        let requires = self.collect_dependency_specs(&change_id, DependencyKind::Require)?;
        let conflicts = self.collect_dependency_specs(&change_id, DependencyKind::Conflict)?;
        self.conn.execute(
            "DELETE FROM dependencies WHERE change_id = ?1",
            params![change_id],
        )?;

        self.conn
            .execute("DELETE FROM changes WHERE change_id = ?1", params![change_id])?;

        self.log_event(EventKind::Revert, change, &tags, &requires, &conflicts)
    }

    /// Record a failed deploy: a `fail` event only, computed from the
    /// in-memory change. No other table is touched.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn log_fail_change(&self, change: &Change) -> Result<(), RegistryError> {
        self.log_event(
            EventKind::Fail,
            change,
            &join_comma(change.tag_names()),
            &join_comma(change.dependency_specs(DependencyKind::Require)),
            &join_comma(change.dependency_specs(DependencyKind::Conflict)),
        )
    }

    /// Insert any of the change's tags not yet present, by tag id.
    ///
    /// Per-row conditional insert, not an upsert: tags that already exist
    /// are left untouched and cause no error. No-op for an untagged change.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn log_new_tags(&self, change: &Change) -> Result<(), RegistryError> {
        if change.tags.is_empty() {
            return Ok(());
        }

        let change_id = change.id();
        let mut stmt = self.conn.prepare(
            "INSERT INTO tags (tag_id, tag, project, change_id, note, committed_at, \
             committer_name, committer_email, planned_at, planner_name, planner_email) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11 \
             WHERE NOT EXISTS (SELECT 1 FROM tags WHERE tag_id = ?1)",
        )?;
        for tag in &change.tags {
            let committed_at = self.dialect.format_timestamp(&Utc::now());
            stmt.execute(params![
                tag.id(&change.project),
                tag.name,
                change.project,
                change_id,
                tag.note,
                committed_at,
                self.operator.name,
                self.operator.email,
                self.dialect.format_timestamp(&tag.planned_at),
                tag.planner.name,
                tag.planner.email
            ])?;
        }
        Ok(())
    }

    fn log_event(
        &self,
        kind: EventKind,
        change: &Change,
        tags: &str,
        requires: &str,
        conflicts: &str,
    ) -> Result<(), RegistryError> {
        let committed_at = self.dialect.format_timestamp(&Utc::now());
        self.conn.execute(
            "INSERT INTO events (event, change_id, change, project, note, requires, \
             conflicts, tags, committed_at, committer_name, committer_email, \
             planned_at, planner_name, planner_email) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                kind.as_str(),
                change.id(),
                change.name,
                change.project,
                change.note,
                requires,
                conflicts,
                tags,
                committed_at,
                self.operator.name,
                self.operator.email,
                self.dialect.format_timestamp(&change.planned_at),
                change.planner.name,
                change.planner.email
            ],
        )?;
        Ok(())
    }

    fn collect_joined(&self, sql: &str, change_id: &str) -> Result<String, RegistryError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![change_id], |row| row.get::<_, String>(0))?;
        let values = rows.collect::<Result<Vec<String>, _>>()?;
        Ok(values.join(","))
    }

    fn collect_dependency_specs(
        &self,
        change_id: &str,
        kind: DependencyKind,
    ) -> Result<String, RegistryError> {
        let mut stmt = self.conn.prepare(
            "SELECT dependency FROM dependencies \
             WHERE change_id = ?1 AND type = ?2 ORDER BY dependency",
        )?;
        let rows = stmt.query_map(params![change_id, kind.as_str()], |row| {
            row.get::<_, String>(0)
        })?;
        let values = rows.collect::<Result<Vec<String>, _>>()?;
        Ok(values.join(","))
    }

    // -----------------------------------------------------------------------
    // State queries
    // -----------------------------------------------------------------------

    /// Change id at `offset` from the start of the project's deployment
    /// order; `None` past the end, and also when the ledger schema has not
    /// been provisioned on this target at all.
    ///
    /// # Errors
    ///
    /// Propagates backend errors other than the unprovisioned-schema case.
    pub fn earliest_change_id(
        &self,
        project: Option<&str>,
        offset: u32,
    ) -> Result<Option<String>, RegistryError> {
        self.change_id_offset_from(project, offset, "ASC")
    }

    /// Change id at `offset` from the end of the project's deployment
    /// order; see [`earliest_change_id`](Self::earliest_change_id).
    ///
    /// # Errors
    ///
    /// Propagates backend errors other than the unprovisioned-schema case.
    pub fn latest_change_id(
        &self,
        project: Option<&str>,
        offset: u32,
    ) -> Result<Option<String>, RegistryError> {
        self.change_id_offset_from(project, offset, "DESC")
    }

    fn change_id_offset_from(
        &self,
        project: Option<&str>,
        offset: u32,
        direction: &str,
    ) -> Result<Option<String>, RegistryError> {
        if !self.dialect.ledger_exists(self.conn)? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT change_id FROM changes WHERE project = ?1 \
             ORDER BY committed_at {direction} LIMIT 1 OFFSET ?2"
        );
        self.conn
            .query_row(&sql, params![self.project_or(project), offset], |row| {
                row.get(0)
            })
            .optional()
            .map_err(Into::into)
    }

    /// The most recently deployed change for the project, with decoded
    /// timestamps and its tag names in commit order, or `None` when nothing
    /// is deployed.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn current_state(
        &self,
        project: Option<&str>,
    ) -> Result<Option<DeployedState>, RegistryError> {
        let sql = format!(
            "{} WHERE project = ?1 ORDER BY committed_at DESC LIMIT 1",
            self.select_changes()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![self.project_or(project)])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let change = decode_change_row(row, &self.dialect)?;
        drop(rows);

        let mut tag_stmt = self.conn.prepare(
            "SELECT tag FROM tags WHERE change_id = ?1 ORDER BY committed_at",
        )?;
        let tag_rows = tag_stmt.query_map(params![change.change_id], |row| row.get(0))?;
        let tags = tag_rows.collect::<Result<Vec<String>, _>>()?;

        Ok(Some(DeployedState { change, tags }))
    }

    /// Lazy newest-first cursor over all deployed changes for the project.
    ///
    /// # Errors
    ///
    /// Returns an error if preparing the statement fails.
    pub fn current_changes(
        &self,
        project: Option<&str>,
    ) -> Result<Cursor<'_, D, ChangeRow>, RegistryError> {
        let sql = format!(
            "{} WHERE project = ?1 ORDER BY committed_at DESC",
            self.select_changes()
        );
        let stmt = self.conn.prepare(&sql)?;
        let params: Vec<Box<dyn ToSql>> =
            vec![Box::new(self.project_or(project).to_string())];
        Ok(Cursor::new(stmt, params, &self.dialect, decode_change_row))
    }

    /// Lazy newest-first cursor over all tags currently attached to
    /// deployed changes of the project.
    ///
    /// # Errors
    ///
    /// Returns an error if preparing the statement fails.
    pub fn current_tags(
        &self,
        project: Option<&str>,
    ) -> Result<Cursor<'_, D, TagRow>, RegistryError> {
        let sql = format!(
            "SELECT tag_id, tag, project, change_id, note, {committed}, \
             committer_name, committer_email, {planned}, planner_name, planner_email \
             FROM tags WHERE project = ?1 ORDER BY committed_at DESC",
            committed = self.dialect.timestamp_expr("committed_at"),
            planned = self.dialect.timestamp_expr("planned_at"),
        );
        let stmt = self.conn.prepare(&sql)?;
        let params: Vec<Box<dyn ToSql>> =
            vec![Box::new(self.project_or(project).to_string())];
        Ok(Cursor::new(stmt, params, &self.dialect, decode_tag_row))
    }

    /// Lazy scan of the event log, filtered/sorted/paginated per `search`.
    ///
    /// # Errors
    ///
    /// Returns an error if preparing the statement fails.
    pub fn search_events(
        &self,
        search: &EventSearch,
    ) -> Result<Cursor<'_, D, EventRecord>, RegistryError> {
        let (sql, params) = search.build(&self.dialect);
        let stmt = self.conn.prepare(&sql)?;
        Ok(Cursor::new(stmt, params, &self.dialect, decode_event_record))
    }

    // -----------------------------------------------------------------------
    // Dependency and naming queries
    // -----------------------------------------------------------------------

    /// Whether a change id is currently deployed.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn is_deployed_change(&self, change_id: &str) -> Result<bool, RegistryError> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM changes WHERE change_id = ?1)",
                params![change_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// The subset of `change_ids` that are currently deployed; order
    /// unspecified.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn are_deployed_changes(&self, change_ids: &[&str]) -> Result<Vec<String>, RegistryError> {
        if change_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=change_ids.len())
            .map(|n| format!("?{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT change_id FROM changes WHERE change_id IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(change_ids.iter()), |row| row.get(0))?;
        rows.collect::<Result<Vec<String>, _>>().map_err(Into::into)
    }

    /// Every deployed change whose dependencies require `change`, annotated
    /// with the nearest tag at or after the dependent's own commit position
    /// (for display), in commit order.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn changes_requiring_change(
        &self,
        change: &Change,
    ) -> Result<Vec<RequiringChange>, RegistryError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.change_id, c.project, c.change, ( \
                 SELECT t.tag FROM tags t \
                  WHERE t.project = c.project AND t.committed_at >= c.committed_at \
                  ORDER BY t.committed_at LIMIT 1 \
             ) AS asof_tag \
             FROM dependencies d \
             JOIN changes c ON c.change_id = d.change_id \
             WHERE d.dependency_id = ?1 AND d.type = 'require' \
             ORDER BY c.committed_at",
        )?;
        let rows = stmt.query_map(params![change.id()], |row| {
            Ok(RequiringChange {
                change_id: row.get(0)?,
                project: row.get(1)?,
                change: row.get(2)?,
                asof_tag: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Resolve a deployed change id to `"<name>"` or `"<name>@<tag>"`,
    /// using the earliest tag committed at or after the change within its
    /// project. `None` for ids the ledger does not know.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn name_for_change_id(&self, change_id: &str) -> Result<Option<String>, RegistryError> {
        self.conn
            .query_row(
                "SELECT c.change || COALESCE(( \
                     SELECT '@' || t.tag FROM tags t \
                      WHERE t.project = c.project AND t.committed_at >= c.committed_at \
                      ORDER BY t.committed_at LIMIT 1 \
                 ), '') \
                 FROM changes c WHERE c.change_id = ?1",
                params![change_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn select_changes(&self) -> String {
        format!(
            "SELECT change_id, change, project, note, {committed}, \
             committer_name, committer_email, {planned}, planner_name, planner_email \
             FROM changes",
            committed = self.dialect.timestamp_expr("committed_at"),
            planned = self.dialect.timestamp_expr("planned_at"),
        )
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn decode_change_row<D: Dialect>(
    row: &rusqlite::Row<'_>,
    dialect: &D,
) -> Result<ChangeRow, RegistryError> {
    Ok(ChangeRow {
        change_id: row.get(0)?,
        change: row.get(1)?,
        project: row.get(2)?,
        note: row.get(3)?,
        committed_at: dialect.parse_timestamp(&row.get::<_, String>(4)?)?,
        committer: Identity::new(row.get::<_, String>(5)?, row.get::<_, String>(6)?),
        planned_at: dialect.parse_timestamp(&row.get::<_, String>(7)?)?,
        planner: Identity::new(row.get::<_, String>(8)?, row.get::<_, String>(9)?),
    })
}

fn decode_tag_row<D: Dialect>(
    row: &rusqlite::Row<'_>,
    dialect: &D,
) -> Result<TagRow, RegistryError> {
    Ok(TagRow {
        tag_id: row.get(0)?,
        tag: row.get(1)?,
        project: row.get(2)?,
        change_id: row.get(3)?,
        note: row.get(4)?,
        committed_at: dialect.parse_timestamp(&row.get::<_, String>(5)?)?,
        committer: Identity::new(row.get::<_, String>(6)?, row.get::<_, String>(7)?),
        planned_at: dialect.parse_timestamp(&row.get::<_, String>(8)?)?,
        planner: Identity::new(row.get::<_, String>(9)?, row.get::<_, String>(10)?),
    })
}

fn decode_event_record<D: Dialect>(
    row: &rusqlite::Row<'_>,
    dialect: &D,
) -> Result<EventRecord, RegistryError> {
    let kind: String = row.get(0)?;
    let event = kind.parse::<EventKind>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error))
    })?;
    Ok(EventRecord {
        event,
        change_id: row.get(1)?,
        change: row.get(2)?,
        project: row.get(3)?,
        note: row.get(4)?,
        requires: split_comma(&row.get::<_, String>(5)?),
        conflicts: split_comma(&row.get::<_, String>(6)?),
        tags: split_comma(&row.get::<_, String>(7)?),
        committed_at: dialect.parse_timestamp(&row.get::<_, String>(8)?)?,
        committer: Identity::new(row.get::<_, String>(9)?, row.get::<_, String>(10)?),
        planned_at: dialect.parse_timestamp(&row.get::<_, String>(11)?)?,
        planner: Identity::new(row.get::<_, String>(12)?, row.get::<_, String>(13)?),
    })
}

fn join_comma(values: Vec<&str>) -> String {
    values.join(",")
}

fn split_comma(text: &str) -> Vec<String> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split(',').map(str::to_string).collect()
    }
}
