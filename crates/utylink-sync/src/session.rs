//! Per-connection synchronization state.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;
use utylink_protocol::{Connected, NetworkItem, SlotId};

use crate::game::KEY_PIECE;
use crate::items::ItemPlacer;
use crate::routes::{Route, RouteProgress};

/// What the slot has to do to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Goal {
    /// Complete all three routes, possibly across several playthroughs.
    AllRoutes,
    /// Reach the ending whose victory marker contains this name.
    Route(String),
}

impl Goal {
    pub fn parse(name: &str) -> Self {
        match name {
            "all_routes" => Self::AllRoutes,
            other => Self::Route(other.to_string()),
        }
    }

    /// Whether the goal is met given the victory markers currently on
    /// disk and the confirmed route flags.
    pub fn is_reached(&self, victories: &[String], routes: &RouteProgress) -> bool {
        match self {
            Self::AllRoutes => routes.all_done(),
            Self::Route(name) => victories.iter().any(|stem| stem.contains(name.as_str())),
        }
    }
}

/// State that exists between `Connected` and the end of the connection.
#[derive(Debug)]
pub struct Session {
    pub slot: SlotId,
    pub team: u32,
    /// Our own player name, used as the source of outbound deaths.
    pub player_name: String,
    /// `None` if the server didn't say which route counts.
    pub goal: Option<Goal>,
    /// Key pieces that unlock the key-hunt rewards; 0 when key hunt is off.
    pub key_pieces_needed: usize,
    /// Received items, contiguous from index 0.
    items: Vec<NetworkItem>,
    /// Key pieces among `items`.
    key_pieces: usize,
    /// Every location we know to be checked, in server numbering.
    pub checked: BTreeSet<i64>,
    /// Every location that exists for this slot.
    pub server_locations: HashSet<i64>,
    pub routes: RouteProgress,
    pub placer: ItemPlacer,
    finished: bool,
}

impl Session {
    pub fn new(connected: &Connected) -> Self {
        let slot_data = &connected.slot_data;

        let goal = slot_data.get("route").and_then(Value::as_str).map(Goal::parse);
        if goal.is_none() {
            tracing::warn!(slot = %connected.slot, "slot data has no route, goal will not be reported");
        }

        let key_hunt = slot_data.get("key_hunt").is_some_and(truthy);
        let key_pieces_needed = if key_hunt {
            slot_data
                .get("key_pieces")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize
        } else {
            0
        };

        let player_name = connected
            .players
            .iter()
            .find(|p| p.slot == connected.slot && p.team == connected.team)
            .map(|p| if p.alias.is_empty() { p.name.clone() } else { p.alias.clone() })
            .unwrap_or_else(|| format!("Player {}", connected.slot));

        let checked: BTreeSet<i64> = connected.checked_locations.iter().copied().collect();
        let server_locations = connected
            .missing_locations
            .iter()
            .chain(&connected.checked_locations)
            .copied()
            .collect();

        Self {
            slot: connected.slot,
            team: connected.team,
            player_name,
            goal,
            key_pieces_needed,
            items: Vec::new(),
            key_pieces: 0,
            checked,
            server_locations,
            routes: RouteProgress::default(),
            placer: ItemPlacer::new(),
            finished: false,
        }
    }

    pub fn items(&self) -> &[NetworkItem] {
        &self.items
    }

    /// Appends the next received item.
    pub fn push_item(&mut self, item: NetworkItem) {
        if item.item == KEY_PIECE {
            self.key_pieces += 1;
        }
        self.items.push(item);
    }

    pub fn key_pieces(&self) -> usize {
        self.key_pieces
    }

    /// `true` once enough key pieces have arrived. Never true when key
    /// hunt is off.
    pub fn key_hunt_complete(&self) -> bool {
        self.key_pieces_needed > 0 && self.key_pieces() >= self.key_pieces_needed
    }

    /// Routes whose victory marker is on disk but that the server hasn't
    /// confirmed yet.
    pub fn unconfirmed_routes<'a>(&'a self, victories: &'a [String]) -> impl Iterator<Item = Route> + 'a {
        let mut seen = Vec::new();
        victories
            .iter()
            .flat_map(|stem| Route::in_marker(stem))
            .filter(move |route| {
                if seen.contains(route) {
                    return false;
                }
                seen.push(*route);
                !self.routes.is_done(*route)
            })
    }

    /// Latches the finished flag. Returns `true` only the first time.
    pub fn finish(&mut self) -> bool {
        !std::mem::replace(&mut self.finished, true)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Clears received items for a full replay.
    pub fn reset_items(&mut self) {
        self.items.clear();
        self.key_pieces = 0;
        self.placer.reset();
    }
}

/// Slot data options may arrive as booleans or as 0/1 integers.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use utylink_protocol::NetworkPlayer;

    use super::*;

    fn connected(slot_data: Value) -> Connected {
        Connected {
            team: 0,
            slot: SlotId(2),
            players: vec![NetworkPlayer {
                team: 0,
                slot: SlotId(2),
                alias: String::new(),
                name: "Clover".into(),
            }],
            missing_locations: vec![12_001, 12_002],
            checked_locations: vec![12_003],
            slot_data,
        }
    }

    #[test]
    fn test_new_reads_slot_data() {
        let s = Session::new(&connected(json!({"route": "pacifist", "key_hunt": true, "key_pieces": 3})));
        assert_eq!(s.goal, Some(Goal::Route("pacifist".into())));
        assert_eq!(s.key_pieces_needed, 3);
        assert_eq!(s.player_name, "Clover");
        assert_eq!(s.server_locations.len(), 3);
        assert!(s.checked.contains(&12_003));
    }

    #[test]
    fn test_key_pieces_ignored_without_key_hunt() {
        let s = Session::new(&connected(json!({"route": "all_routes", "key_hunt": 0, "key_pieces": 3})));
        assert_eq!(s.goal, Some(Goal::AllRoutes));
        assert_eq!(s.key_pieces_needed, 0);
        assert!(!s.key_hunt_complete());
    }

    #[test]
    fn test_missing_route_has_no_goal() {
        let s = Session::new(&connected(Value::Null));
        assert_eq!(s.goal, None);
    }

    #[test]
    fn test_single_route_goal_matches_marker_stem() {
        let goal = Goal::parse("genocide");
        let routes = RouteProgress::default();
        assert!(!goal.is_reached(&["neutral".into()], &routes));
        assert!(goal.is_reached(&["genocide".into()], &routes));
    }

    fn key_piece(location: i64) -> NetworkItem {
        NetworkItem {
            item: KEY_PIECE,
            location,
            player: SlotId(3),
            flags: 0,
        }
    }

    #[test]
    fn test_key_piece_count_follows_items_and_resets() {
        let mut s = Session::new(&connected(json!({"route": "neutral", "key_hunt": true, "key_pieces": 2})));
        s.push_item(key_piece(12_001));
        s.push_item(NetworkItem {
            item: 77_508,
            ..key_piece(12_002)
        });
        assert_eq!(s.key_pieces(), 1);
        assert!(!s.key_hunt_complete());

        s.push_item(key_piece(12_003));
        assert_eq!(s.items().len(), 3);
        assert!(s.key_hunt_complete());

        s.reset_items();
        assert_eq!(s.key_pieces(), 0);
        assert!(s.items().is_empty());
        assert!(!s.key_hunt_complete());
    }

    #[test]
    fn test_finish_latches() {
        let mut s = Session::new(&connected(json!({"route": "neutral"})));
        assert!(s.finish());
        assert!(!s.finish());
        assert!(s.is_finished());
    }

    #[test]
    fn test_unconfirmed_routes_skip_confirmed_and_duplicates() {
        let mut s = Session::new(&connected(json!({"route": "all_routes"})));
        s.routes.merge(Route::Neutral, 1);
        let victories = vec!["neutral".to_string(), "pacifist".to_string(), "pacifist_alt".to_string()];
        let routes: Vec<Route> = s.unconfirmed_routes(&victories).collect();
        assert_eq!(routes, vec![Route::Pacifist]);
    }
}
