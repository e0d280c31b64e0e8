//! SQL schema for Quay database files.
//!
//! Every physical file carries the `scalar_variable` table; the catalog root
//! file additionally holds the catalog, account and sequence tables. Both
//! scripts are idempotent thanks to `IF NOT EXISTS` and `INSERT OR IGNORE`,
//! so they run on every open.
//!
//! Files stay in the default rollback-journal mode so that a closed database
//! is exactly one file on disk and can be renamed or removed as a unit.

/// DDL shared by every physical file.
pub const VARIABLES: &str = "
PRAGMA foreign_keys = ON;

-- One typed value per name; the value column holds JSON (bool, number or
-- string).
CREATE TABLE IF NOT EXISTS scalar_variable (
    name  TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// DDL specific to the catalog root file.
pub const CATALOG: &str = "
-- Snapshot rows. `version` is the highest event sequence number already
-- folded into the row; `set` events never rewrite it.
CREATE TABLE IF NOT EXISTS catalog_entry (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    name     TEXT    NOT NULL UNIQUE,
    admins   TEXT    NOT NULL DEFAULT '[]',   -- JSON array of account ids
    readers  TEXT    NOT NULL DEFAULT '[]',
    writers  TEXT    NOT NULL DEFAULT '[]',
    version  INTEGER NOT NULL DEFAULT 0
);

-- Append-only. NULL columns mean \"unchanged\".
CREATE TABLE IF NOT EXISTS catalog_change_event (
    seq       INTEGER PRIMARY KEY,              -- from event_sequence
    kind      TEXT    NOT NULL CHECK (kind IN ('add', 'set', 'delete')),
    entry_id  INTEGER NOT NULL,
    name      TEXT,
    admins    TEXT,
    readers   TEXT,
    writers   TEXT
);

CREATE TABLE IF NOT EXISTS account (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT    NOT NULL UNIQUE,
    password_hash  TEXT    NOT NULL,
    salt           TEXT    NOT NULL,
    version        INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS account_change_event (
    seq            INTEGER PRIMARY KEY,
    kind           TEXT    NOT NULL CHECK (kind IN ('add', 'set', 'delete')),
    account_id     INTEGER NOT NULL,
    name           TEXT,
    password_hash  TEXT,
    salt           TEXT
);

-- The store-wide event sequence shared by every change-event table.
CREATE TABLE IF NOT EXISTS event_sequence (
    id     INTEGER PRIMARY KEY CHECK (id = 1),
    value  INTEGER NOT NULL
);
INSERT OR IGNORE INTO event_sequence (id, value) VALUES (1, 0);

CREATE INDEX IF NOT EXISTS catalog_change_event_entry_idx
    ON catalog_change_event(entry_id, seq);
CREATE INDEX IF NOT EXISTS account_change_event_account_idx
    ON account_change_event(account_id, seq);
";
