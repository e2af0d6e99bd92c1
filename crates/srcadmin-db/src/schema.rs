//! Database schema for srcadmin

/// SQLite schema initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS instances (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    install_path TEXT NOT NULL,
    port INTEGER NOT NULL,
    max_players INTEGER NOT NULL DEFAULT 10,
    game_mode TEXT NOT NULL DEFAULT 'competitive',
    current_map TEXT NOT NULL DEFAULT '',
    launch_args TEXT NOT NULL DEFAULT '',
    rcon_password TEXT NOT NULL DEFAULT '',
    auto_restart INTEGER NOT NULL DEFAULT 1,
    auto_start INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'stopped',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    instance_id TEXT NOT NULL,
    cron_expr TEXT NOT NULL,
    action TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1,
    last_run TEXT,
    next_run TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tasks_instance_id ON tasks(instance_id);

CREATE TABLE IF NOT EXISTS samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    cpu_percent REAL NOT NULL DEFAULT 0,
    ram_mb REAL NOT NULL DEFAULT 0,
    tick_rate REAL NOT NULL DEFAULT 0,
    players INTEGER NOT NULL DEFAULT 0,
    net_in_kbps REAL NOT NULL DEFAULT 0,
    net_out_kbps REAL NOT NULL DEFAULT 0,
    FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_samples_instance_id ON samples(instance_id);
CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON samples(instance_id, timestamp);

CREATE TABLE IF NOT EXISTS benchmarks (
    id TEXT PRIMARY KEY,
    instance_id TEXT NOT NULL,
    bot_count INTEGER NOT NULL,
    avg_tickrate REAL NOT NULL DEFAULT 0,
    min_tickrate REAL NOT NULL DEFAULT 0,
    avg_frametime REAL NOT NULL DEFAULT 0,
    cpu_usage REAL NOT NULL DEFAULT 0,
    ram_usage REAL NOT NULL DEFAULT 0,
    duration_sec INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_benchmarks_instance_id ON benchmarks(instance_id);

CREATE TABLE IF NOT EXISTS bans (
    id TEXT PRIMARY KEY,
    instance_id TEXT NOT NULL,
    steam_id TEXT NOT NULL,
    ip_address TEXT NOT NULL DEFAULT '',
    reason TEXT NOT NULL DEFAULT '',
    expires_at TEXT,
    is_permanent INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_bans_instance_id ON bans(instance_id);
CREATE INDEX IF NOT EXISTS idx_bans_steam_id ON bans(steam_id);
"#;
