//! Deploy/revert/fail recording: projection rows, the audit trail, and
//! transactional atomicity.

mod common;

use common::{change, count, deploy, ledger_conn, registry, require, revert, tag};
use serde_json::json;
use stratum_registry::{EventKind, EventSearch, Txn};

#[test]
fn deploy_writes_projection_rows_and_event() {
    let conn = ledger_conn();
    let reg = registry(&conn);
    reg.register_project().expect("register");

    let mut users = change("users");
    users.tags.push(tag("v1.0.0"));

    let mut widgets = change("widgets");
    widgets.dependencies.push(require(&users));

    deploy(&conn, &reg, &users);
    deploy(&conn, &reg, &widgets);

    assert_eq!(count(&conn, "changes", &users.id()), 1);
    assert_eq!(count(&conn, "tags", &users.id()), 1);
    assert_eq!(count(&conn, "dependencies", &widgets.id()), 1);

    let mut cursor = reg
        .search_events(&EventSearch::default())
        .expect("search events");
    let events: Vec<_> = cursor
        .rows()
        .expect("open rows")
        .collect::<Result<_, _>>()
        .expect("decode events");
    assert_eq!(events.len(), 2);

    // Newest first by default: widgets then users.
    assert_eq!(events[0].change, "widgets");
    assert_eq!(events[0].event, EventKind::Deploy);
    assert_eq!(events[0].requires, vec!["users"]);
    assert_eq!(events[1].change, "users");
    assert_eq!(events[1].tags, vec!["v1.0.0"]);
    assert_eq!(events[1].committer.name, "Benny Ledger");
    assert_eq!(events[1].planner.name, "Pat Planner");
}

#[test]
fn deploy_then_revert_round_trip() {
    let conn = ledger_conn();
    let reg = registry(&conn);
    reg.register_project().expect("register");

    let mut users = change("users");
    users.tags.push(tag("v1.0.0"));
    users.dependencies.push(stratum_plan::Dependency::require("roles"));
    users.dependencies.push(stratum_plan::Dependency::conflict("legacy-users"));

    deploy(&conn, &reg, &users);
    revert(&conn, &reg, &users);

    let id = users.id();
    assert_eq!(count(&conn, "changes", &id), 0);
    assert_eq!(count(&conn, "tags", &id), 0);
    assert_eq!(count(&conn, "dependencies", &id), 0);

    let options = json!({"event": ["deploy", "revert"]});
    let search = EventSearch::from_options(options.as_object().expect("object"))
        .expect("valid options");
    let mut cursor = reg.search_events(&search).expect("search events");
    let events: Vec<_> = cursor
        .rows()
        .expect("open rows")
        .collect::<Result<_, _>>()
        .expect("decode events");
    assert_eq!(events.len(), 2);

    // DESC default: revert first.
    assert_eq!(events[0].event, EventKind::Revert);
    assert_eq!(events[1].event, EventKind::Deploy);

    // The revert event preserves what was deleted.
    assert_eq!(events[0].tags, vec!["v1.0.0"]);
    assert_eq!(events[0].requires, vec!["roles"]);
    assert_eq!(events[0].conflicts, vec!["legacy-users"]);
}

#[test]
fn change_row_exists_iff_deploy_without_subsequent_revert() {
    let conn = ledger_conn();
    let reg = registry(&conn);
    reg.register_project().expect("register");

    let users = change("users");
    let widgets = change("widgets");

    deploy(&conn, &reg, &users);
    deploy(&conn, &reg, &widgets);
    revert(&conn, &reg, &widgets);

    assert!(reg.is_deployed_change(&users.id()).expect("check users"));
    assert!(!reg.is_deployed_change(&widgets.id()).expect("check widgets"));

    // users: one deploy event, no revert. widgets: deploy then revert.
    let per_change = |id: &str| -> Vec<EventKind> {
        let mut stmt = conn
            .prepare("SELECT event FROM events WHERE change_id = ?1 ORDER BY committed_at")
            .expect("prepare");
        stmt.query_map([id], |row| row.get::<_, String>(0))
            .expect("query")
            .map(|kind| kind.expect("read").parse().expect("known kind"))
            .collect()
    };
    assert_eq!(per_change(&users.id()), vec![EventKind::Deploy]);
    assert_eq!(
        per_change(&widgets.id()),
        vec![EventKind::Deploy, EventKind::Revert]
    );
}

#[test]
fn fail_touches_only_the_event_log() {
    let conn = ledger_conn();
    let reg = registry(&conn);
    reg.register_project().expect("register");

    let mut broken = change("broken");
    broken.tags.push(tag("v0.9.0"));
    broken.dependencies.push(stratum_plan::Dependency::require("users"));

    reg.log_fail_change(&broken).expect("log fail");

    let id = broken.id();
    assert_eq!(count(&conn, "changes", &id), 0);
    assert_eq!(count(&conn, "tags", &id), 0);
    assert_eq!(count(&conn, "dependencies", &id), 0);

    let mut cursor = reg
        .search_events(&EventSearch::default())
        .expect("search events");
    let events: Vec<_> = cursor
        .rows()
        .expect("open rows")
        .collect::<Result<_, _>>()
        .expect("decode events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventKind::Fail);
    assert_eq!(events[0].tags, vec!["v0.9.0"]);
    assert_eq!(events[0].requires, vec!["users"]);
}

#[test]
fn deploy_rolls_back_as_a_unit() {
    let conn = ledger_conn();
    let reg = registry(&conn);
    reg.register_project().expect("register");

    let users = change("users");

    let txn = Txn::begin(&conn).expect("begin");
    reg.log_deploy_change(&users).expect("log deploy");
    txn.rollback().expect("rollback");

    assert_eq!(count(&conn, "changes", &users.id()), 0);
    let events: i64 = conn
        .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
        .expect("count events");
    assert_eq!(events, 0);
}

#[test]
fn log_new_tags_inserts_each_tag_once() {
    let conn = ledger_conn();
    let reg = registry(&conn);
    reg.register_project().expect("register");

    let mut users = change("users");
    users.tags.push(tag("v1.0.0"));
    deploy(&conn, &reg, &users);

    // The plan grew a second tag on the already-deployed change.
    users.tags.push(tag("v1.1.0"));
    reg.log_new_tags(&users).expect("backfill tags");
    reg.log_new_tags(&users).expect("second backfill is a no-op");

    assert_eq!(count(&conn, "tags", &users.id()), 2);

    let distinct: i64 = conn
        .query_row("SELECT COUNT(DISTINCT tag_id) FROM tags", [], |row| row.get(0))
        .expect("count distinct tag ids");
    assert_eq!(distinct, 2);
}

#[test]
fn log_new_tags_without_tags_is_a_no_op() {
    let conn = ledger_conn();
    let reg = registry(&conn);
    reg.register_project().expect("register");

    let users = change("users");
    deploy(&conn, &reg, &users);
    reg.log_new_tags(&users).expect("no-op");
    assert_eq!(count(&conn, "tags", &users.id()), 0);
}
