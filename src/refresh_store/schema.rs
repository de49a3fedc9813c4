//! SQLite schema definitions for the refresh database.
//!
//! Holds the deferred refresh queue, its run history, the settings store,
//! site size counters and report cache freshness markers.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Queue, run history and settings
// =============================================================================

/// Refresh queue - at most one entry per (hook, args) in each status
const REFRESH_QUEUE_TABLE_V1: Table = Table {
    name: "refresh_queue",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("hook", &SqlType::Text, non_null = true),
        sqlite_column!("args", &SqlType::Text, non_null = true),
        sqlite_column!("run_at", &SqlType::Integer, non_null = true), // unix seconds
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("claimed_at", &SqlType::Text),
    ],
    indices: &[("idx_refresh_queue_status_run_at", "status, run_at")],
    unique_constraints: &[&["hook", "args", "status"]],
};

/// Refresh runs - history of executed queue entries
const REFRESH_RUNS_TABLE_V1: Table = Table {
    name: "refresh_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("hook", &SqlType::Text, non_null = true),
        sqlite_column!("args", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
    ],
    indices: &[
        ("idx_refresh_runs_started", "started_at DESC"),
        ("idx_refresh_runs_status", "status"),
    ],
    unique_constraints: &[],
};

/// Settings - persisted key-value flags
const SETTINGS_TABLE_V1: Table = Table {
    name: "settings",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some("(datetime('now'))")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Site counters and report cache markers
// =============================================================================

/// Site counters - subscription and order totals used to detect large sites
const SITE_COUNTERS_TABLE_V2: Table = Table {
    name: "site_counters",
    columns: &[
        sqlite_column!("name", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some("(datetime('now'))")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Report cache - when each report dataset was last recomputed
const REPORT_CACHE_TABLE_V2: Table = Table {
    name: "report_cache",
    columns: &[
        sqlite_column!("report", &SqlType::Text, non_null = true),
        sqlite_column!("report_range", &SqlType::Text, non_null = true),
        sqlite_column!("period_start", &SqlType::Text),
        sqlite_column!("period_end", &SqlType::Text),
        sqlite_column!("refreshed_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["report", "report_range"]],
};

/// Migration from version 1 to version 2: add site_counters and report_cache
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE site_counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE report_cache (
            report TEXT NOT NULL,
            report_range TEXT NOT NULL,
            period_start TEXT,
            period_end TEXT,
            refreshed_at TEXT NOT NULL,
            UNIQUE (report, report_range)
        )",
        [],
    )?;
    Ok(())
}

pub const REFRESH_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            REFRESH_QUEUE_TABLE_V1,
            REFRESH_RUNS_TABLE_V1,
            SETTINGS_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            REFRESH_QUEUE_TABLE_V1,
            REFRESH_RUNS_TABLE_V1,
            SETTINGS_TABLE_V1,
            SITE_COUNTERS_TABLE_V2,
            REPORT_CACHE_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
