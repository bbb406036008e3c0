//! Shared fixtures for ledger integration tests: an in-memory provisioned
//! target, a registered `flipr` plan, and change/tag builders.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use stratum_plan::{Change, Dependency, Identity, Plan, Tag};
use stratum_registry::{Registry, Txn};
use stratum_sqlite::{SqliteDialect, ensure_ledger, open_in_memory};

pub fn ledger_conn() -> Connection {
    let mut conn = open_in_memory().expect("open in-memory target");
    ensure_ledger(&mut conn).expect("provision ledger");
    conn
}

pub fn bare_conn() -> Connection {
    open_in_memory().expect("open in-memory target")
}

pub fn operator() -> Identity {
    Identity::new("Benny Ledger", "benny@example.com")
}

pub fn planner() -> Identity {
    Identity::new("Pat Planner", "pat@example.com")
}

pub fn plan() -> Plan {
    Plan::new("flipr", Some("https://flipr.example.com/".into()))
}

/// Registry bound to the `flipr` plan; call `register_project` before
/// deploying.
pub fn registry(conn: &Connection) -> Registry<'_, SqliteDialect> {
    Registry::new(conn, SqliteDialect, &plan(), operator())
}

pub fn planned_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 3, 10, 0, 0).unwrap()
}

pub fn change(name: &str) -> Change {
    Change {
        name: name.into(),
        project: "flipr".into(),
        note: format!("Adds {name}."),
        planner: planner(),
        planned_at: planned_at(),
        tags: Vec::new(),
        dependencies: Vec::new(),
    }
}

pub fn tag(name: &str) -> Tag {
    Tag {
        name: name.into(),
        note: String::new(),
        planner: planner(),
        planned_at: planned_at(),
    }
}

/// Require dependency on another change, resolved to its id.
pub fn require(target: &Change) -> Dependency {
    Dependency::require(target.name.clone()).resolved_as(target.id())
}

/// Deploy inside its own transaction, as the engine would.
pub fn deploy(conn: &Connection, registry: &Registry<'_, SqliteDialect>, change: &Change) {
    // Keep commit instants distinct even on coarse clocks; commit order is
    // what every state query sorts by.
    std::thread::sleep(std::time::Duration::from_millis(2));
    let txn = Txn::begin(conn).expect("begin deploy txn");
    registry.log_deploy_change(change).expect("log deploy");
    txn.commit().expect("commit deploy");
}

/// Revert inside its own transaction, as the engine would.
pub fn revert(conn: &Connection, registry: &Registry<'_, SqliteDialect>, change: &Change) {
    std::thread::sleep(std::time::Duration::from_millis(2));
    let txn = Txn::begin(conn).expect("begin revert txn");
    registry.log_revert_change(change).expect("log revert");
    txn.commit().expect("commit revert");
}

pub fn count(conn: &Connection, table: &str, change_id: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE change_id = ?1");
    conn.query_row(&sql, [change_id], |row| row.get(0))
        .expect("count rows")
}
