//! Launch-command construction
//!
//! Pure helpers: the executable path inside a server install and the argv
//! the dedicated server is started with.

use srcadmin_core::constants::{DEFAULT_MAP, DEFAULT_MAX_PLAYERS, DEFAULT_RCON_PASSWORD};
use srcadmin_core::Instance;
use std::path::{Path, PathBuf};

/// Map the instance's mode name to the server's (game_mode, game_type) pair.
/// Unknown modes fall back to competitive.
pub fn game_mode_values(mode: &str) -> (u32, u32) {
    match mode.to_lowercase().as_str() {
        "competitive" => (1, 0),
        "casual" => (0, 0),
        "wingman" => (2, 0),
        "deathmatch" | "dm" => (2, 1),
        "custom" => (3, 0),
        _ => (1, 0),
    }
}

/// Server executable inside an install root.
pub fn server_exe_path(install_path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        install_path.join("game").join("bin").join("win64").join("cs2.exe")
    }
    #[cfg(not(windows))]
    {
        install_path
            .join("game")
            .join("bin")
            .join("linuxsteamrt64")
            .join("cs2")
    }
}

/// Build the dedicated-server argv. `rcon_password` is the already-unsealed
/// secret; an empty one falls back to the default.
pub fn build_launch_args(inst: &Instance, rcon_password: &str) -> Vec<String> {
    let (game_mode, game_type) = game_mode_values(&inst.game_mode);

    let map = if inst.current_map.is_empty() {
        DEFAULT_MAP
    } else {
        &inst.current_map
    };
    let max_players = if inst.max_players == 0 {
        DEFAULT_MAX_PLAYERS
    } else {
        inst.max_players
    };
    let password = if rcon_password.is_empty() {
        DEFAULT_RCON_PASSWORD
    } else {
        rcon_password
    };

    let mut args = vec![
        "-dedicated".to_string(),
        "-port".to_string(),
        inst.port.to_string(),
        "+sv_lan".to_string(),
        "1".to_string(),
        "+game_mode".to_string(),
        game_mode.to_string(),
        "+game_type".to_string(),
        game_type.to_string(),
        "+map".to_string(),
        map.to_string(),
        "-maxplayers".to_string(),
        max_players.to_string(),
        "+rcon_password".to_string(),
        password.to_string(),
        "-console".to_string(),
        "-usercon".to_string(),
    ];

    args.extend(inst.launch_args.split_whitespace().map(str::to_string));
    args
}
