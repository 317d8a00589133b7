//! Database query definitions

pub const INSERT_RUNTIME: &str = r#"
    INSERT INTO port_runtime (
        host_id, protocol, port, first_seen_at, last_seen_at,
        last_disappeared_at, current_state, current_pid, process_name,
        cmdline, total_seen_count, total_uptime_seconds
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
"#;

pub const UPDATE_RUNTIME: &str = r#"
    UPDATE port_runtime SET
        last_seen_at = ?2,
        last_disappeared_at = ?3,
        current_state = ?4,
        current_pid = ?5,
        process_name = ?6,
        cmdline = ?7,
        total_seen_count = ?8,
        total_uptime_seconds = ?9
    WHERE id = ?1
"#;

pub const INSERT_EVENT: &str = r#"
    INSERT INTO port_event (port_runtime_id, event_type, timestamp, pid, process_name)
    VALUES (?1, ?2, ?3, ?4, ?5)
"#;

pub const SELECT_RUNTIMES_FOR_HOST: &str = r#"
    SELECT id, host_id, protocol, port, first_seen_at, last_seen_at,
           last_disappeared_at, current_state, current_pid, process_name,
           cmdline, total_seen_count, total_uptime_seconds
    FROM port_runtime
    WHERE host_id = ?1
"#;

pub const SELECT_ALL_RUNTIMES: &str = r#"
    SELECT id, host_id, protocol, port, first_seen_at, last_seen_at,
           last_disappeared_at, current_state, current_pid, process_name,
           cmdline, total_seen_count, total_uptime_seconds
    FROM port_runtime
"#;

pub const SELECT_RUNTIME_BY_KEY: &str = r#"
    SELECT id, host_id, protocol, port, first_seen_at, last_seen_at,
           last_disappeared_at, current_state, current_pid, process_name,
           cmdline, total_seen_count, total_uptime_seconds
    FROM port_runtime
    WHERE host_id = ?1 AND protocol = ?2 AND port = ?3
"#;

pub const SELECT_EVENTS_FOR_RUNTIME: &str = r#"
    SELECT id, port_runtime_id, event_type, timestamp, pid, process_name
    FROM port_event
    WHERE port_runtime_id = ?1
    ORDER BY id DESC
"#;

pub const SELECT_LATEST_EVENT: &str = r#"
    SELECT id, port_runtime_id, event_type, timestamp, pid, process_name
    FROM port_event
    WHERE port_runtime_id = ?1
    ORDER BY id DESC
    LIMIT 1
"#;

pub const SELECT_ALL_NOTES: &str = r#"
    SELECT id, host_id, protocol, port, title, description, owner,
           service_type, risk_level, is_pinned, tags
    FROM port_note
"#;

pub const SELECT_NOTE_BY_KEY: &str = r#"
    SELECT id, host_id, protocol, port, title, description, owner,
           service_type, risk_level, is_pinned, tags
    FROM port_note
    WHERE host_id = ?1 AND protocol = ?2 AND port = ?3
"#;

pub const INSERT_NOTE: &str = r#"
    INSERT INTO port_note (
        host_id, protocol, port, title, description, owner,
        service_type, risk_level, is_pinned, tags
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

pub const UPDATE_NOTE: &str = r#"
    UPDATE port_note SET
        title = ?2,
        description = ?3,
        owner = ?4,
        service_type = ?5,
        risk_level = ?6,
        is_pinned = ?7,
        tags = ?8
    WHERE id = ?1
"#;

pub const DELETE_RUNTIME_BY_KEY: &str = r#"
    DELETE FROM port_runtime WHERE host_id = ?1 AND protocol = ?2 AND port = ?3
"#;

pub const DELETE_NOTE_BY_KEY: &str = r#"
    DELETE FROM port_note WHERE host_id = ?1 AND protocol = ?2 AND port = ?3
"#;
