//! SQL schema for the cardlink SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS accounts (
    account_id          TEXT PRIMARY KEY,
    display_name        TEXT,
    email               TEXT,
    phone               TEXT,
    company             TEXT,
    job_title           TEXT,
    url_slug            TEXT,
    public_url          TEXT,
    google_uid          TEXT,
    google_email        TEXT,
    total_views         INTEGER NOT NULL DEFAULT 0,
    total_contact_saves INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    updated_at          TEXT NOT NULL,
    last_viewed_at      TEXT,
    last_login_at       TEXT
);

-- Backstop for the one-identity-per-account invariant.
CREATE UNIQUE INDEX IF NOT EXISTS accounts_google_uid_idx
    ON accounts(google_uid) WHERE google_uid IS NOT NULL;
CREATE INDEX IF NOT EXISTS accounts_created_idx ON accounts(created_at);

-- Mappings are deactivated, never deleted.
CREATE TABLE IF NOT EXISTS slug_mappings (
    slug         TEXT PRIMARY KEY,
    account_id   TEXT NOT NULL,
    display_name TEXT NOT NULL,
    is_active    INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);

-- Created once per external identity; never updated.
CREATE TABLE IF NOT EXISTS identity_mappings (
    external_id TEXT PRIMARY KEY,
    account_id  TEXT NOT NULL REFERENCES accounts(account_id),
    email       TEXT NOT NULL,
    linked_at   TEXT NOT NULL
);

-- Strictly append-only.
CREATE TABLE IF NOT EXISTS events (
    event_id       TEXT PRIMARY KEY,
    kind           TEXT NOT NULL,   -- 'view' | 'contact_save'
    account_id     TEXT NOT NULL,
    occurred_at    TEXT NOT NULL,
    slug           TEXT,
    user_agent     TEXT,
    referer        TEXT,
    client_address TEXT,
    metadata_json  TEXT
);

CREATE INDEX IF NOT EXISTS events_kind_time_idx    ON events(kind, occurred_at);
CREATE INDEX IF NOT EXISTS events_account_kind_idx ON events(account_id, kind);

CREATE TABLE IF NOT EXISTS daily_aggregates (
    account_id   TEXT NOT NULL,
    date         TEXT NOT NULL,   -- YYYY-MM-DD, UTC
    view_count   INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (account_id, date)
);

CREATE TABLE IF NOT EXISTS global_aggregate (
    id                  INTEGER PRIMARY KEY CHECK (id = 1),
    total_profile_views INTEGER NOT NULL DEFAULT 0,
    total_contact_saves INTEGER NOT NULL DEFAULT 0,
    last_updated        TEXT NOT NULL
);

PRAGMA user_version = 1;
";
