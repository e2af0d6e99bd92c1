//! Parsing of the server's `status` console output

use once_cell::sync::Lazy;
use regex::Regex;

// "players : 3 humans, 2 bots (10 max)" or "players : 5 humans (10 max)"
static PLAYERS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"players\s*:\s*(\d+)\s+humans?(?:,\s*(\d+)\s+bots?)?\s*\((\d+)\s+max\)")
        .expect("invalid players regex")
});

// "tick: 128", "tickrate 64", "tick = 64"
static TICK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:tick|tickrate)\s*[:=]?\s*(\d+)").expect("invalid tick regex")
});

/// Extract (tick rate, player count) from `status` output. Fields that do
/// not appear parse as 0.
pub fn parse_status(out: &str) -> (f64, i64) {
    let mut tick_rate = 0.0;
    let mut players = 0;

    if let Some(caps) = PLAYERS_RE.captures(out) {
        let humans: i64 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let bots: i64 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        players = humans + bots;
    }

    if let Some(caps) = TICK_RE.captures(out) {
        tick_rate = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0.0);
    }

    (tick_rate, players)
}
