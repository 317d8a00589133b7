//! Database schema definitions

pub const SCHEMA_VERSION: i32 = 1;

pub const CREATE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS port_runtime (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        host_id TEXT NOT NULL DEFAULT 'local',
        protocol TEXT NOT NULL,
        port INTEGER NOT NULL,
        first_seen_at TEXT NOT NULL,
        last_seen_at TEXT NOT NULL,
        last_disappeared_at TEXT,
        current_state TEXT NOT NULL DEFAULT 'active',
        current_pid INTEGER,
        process_name TEXT,
        cmdline TEXT,
        total_seen_count INTEGER NOT NULL DEFAULT 1,
        total_uptime_seconds INTEGER NOT NULL DEFAULT 0,
        UNIQUE(host_id, protocol, port)
    );

    CREATE TABLE IF NOT EXISTS port_event (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        port_runtime_id INTEGER NOT NULL
            REFERENCES port_runtime(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        pid INTEGER,
        process_name TEXT
    );

    -- Notes deliberately carry no foreign key to port_runtime: a note may
    -- predate the first observation and must survive the runtime's deletion.
    CREATE TABLE IF NOT EXISTS port_note (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        host_id TEXT NOT NULL DEFAULT 'local',
        protocol TEXT NOT NULL,
        port INTEGER NOT NULL,
        title TEXT,
        description TEXT,
        owner TEXT,
        service_type TEXT NOT NULL DEFAULT 'unknown',
        risk_level TEXT NOT NULL DEFAULT 'expected',
        is_pinned INTEGER NOT NULL DEFAULT 0,
        tags TEXT,
        UNIQUE(host_id, protocol, port)
    );

    -- Indexes for faster queries
    CREATE INDEX IF NOT EXISTS idx_runtime_host ON port_runtime(host_id);
    CREATE INDEX IF NOT EXISTS idx_runtime_state ON port_runtime(current_state);
    CREATE INDEX IF NOT EXISTS idx_event_runtime ON port_event(port_runtime_id);
    CREATE INDEX IF NOT EXISTS idx_event_time ON port_event(timestamp);
    CREATE INDEX IF NOT EXISTS idx_note_host ON port_note(host_id);
"#;
