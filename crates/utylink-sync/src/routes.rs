//! Route completion tracking.
//!
//! Each of the three routes is a 0/1 flag held in server data storage
//! under `"<slot> RoutesDone <route>"`. The flags only ever go up: local
//! victories are raised with a `max` operation, and values coming back
//! from the server are merged the same way.

use std::fmt;

use serde_json::{Value, json};
use utylink_protocol::{ClientCommand, DataStorageOperation, SlotId};

/// One of the game's three endings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Neutral,
    Pacifist,
    Genocide,
}

impl Route {
    pub const ALL: [Route; 3] = [Route::Neutral, Route::Pacifist, Route::Genocide];

    pub fn name(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Pacifist => "pacifist",
            Self::Genocide => "genocide",
        }
    }

    /// Data storage key for this route's flag.
    pub fn storage_key(self, slot: SlotId) -> String {
        format!("{slot} RoutesDone {}", self.name())
    }

    /// The route a storage key belongs to, if it is one of `slot`'s keys.
    pub fn from_storage_key(slot: SlotId, key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.storage_key(slot) == key)
    }

    /// Routes named by a victory marker's file stem. The game has used
    /// decorated stems over time, so this is a substring match.
    pub fn in_marker(stem: &str) -> impl Iterator<Item = Route> + '_ {
        Self::ALL.into_iter().filter(move |r| stem.contains(r.name()))
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Local cache of the three route flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteProgress {
    done: [u8; 3],
}

impl RouteProgress {
    pub fn get(&self, route: Route) -> u8 {
        self.done[route.index()]
    }

    pub fn is_done(&self, route: Route) -> bool {
        self.get(route) > 0
    }

    /// Max-merges `value` (clamped to 0/1) into `route`. Returns `true` if
    /// the flag went up.
    pub fn merge(&mut self, route: Route, value: u8) -> bool {
        let slot = &mut self.done[route.index()];
        let merged = (*slot).max(value.min(1));
        let raised = merged != *slot;
        *slot = merged;
        raised
    }

    /// Applies a value read back from data storage. Keys that aren't
    /// `slot`'s route keys and `null` values are ignored. Returns the
    /// route if its flag went up.
    pub fn apply_remote(&mut self, slot: SlotId, key: &str, value: &Value) -> Option<Route> {
        let route = Route::from_storage_key(slot, key)?;
        let value = remote_flag(value)?;
        self.merge(route, value).then_some(route)
    }

    /// Number of completed routes, 0 to 3.
    pub fn completed(&self) -> u8 {
        self.done.iter().sum()
    }

    pub fn all_done(&self) -> bool {
        self.completed() == 3
    }
}

/// Reads a storage value as a 0/1 flag. `None` for `null` and for values
/// that aren't numbers or booleans.
fn remote_flag(value: &Value) -> Option<u8> {
    match value {
        Value::Bool(b) => Some(u8::from(*b)),
        Value::Number(n) => {
            let positive = n.as_f64().is_some_and(|v| v > 0.0);
            Some(u8::from(positive))
        }
        _ => None,
    }
}

/// `Get` + `SetNotify` for all three route keys of `slot`.
pub fn subscribe_commands(slot: SlotId) -> Vec<ClientCommand> {
    let keys: Vec<String> = Route::ALL.iter().map(|r| r.storage_key(slot)).collect();
    vec![
        ClientCommand::Get { keys: keys.clone() },
        ClientCommand::SetNotify { keys },
    ]
}

/// Raises `route`'s flag to 1 on the server, never lowering it.
pub fn raise_command(slot: SlotId, route: Route) -> ClientCommand {
    ClientCommand::Set {
        key: route.storage_key(slot),
        default: json!(0),
        want_reply: true,
        operations: vec![DataStorageOperation::Max(json!(1))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys() {
        assert_eq!(Route::Pacifist.storage_key(SlotId(3)), "3 RoutesDone pacifist");
        assert_eq!(
            Route::from_storage_key(SlotId(3), "3 RoutesDone genocide"),
            Some(Route::Genocide)
        );
        assert_eq!(Route::from_storage_key(SlotId(4), "3 RoutesDone genocide"), None);
    }

    #[test]
    fn test_marker_matching() {
        assert_eq!(Route::in_marker("pacifist").collect::<Vec<_>>(), vec![Route::Pacifist]);
        assert_eq!(Route::in_marker("true_neutral_end").collect::<Vec<_>>(), vec![Route::Neutral]);
        assert_eq!(Route::in_marker("credits").count(), 0);
    }

    #[test]
    fn test_merge_is_max_for_every_order() {
        for a in 0..=1u8 {
            for b in 0..=1u8 {
                let mut ab = RouteProgress::default();
                ab.merge(Route::Neutral, a);
                ab.merge(Route::Neutral, b);

                let mut ba = RouteProgress::default();
                ba.merge(Route::Neutral, b);
                ba.merge(Route::Neutral, a);

                assert_eq!(ab.get(Route::Neutral), a.max(b));
                assert_eq!(ab, ba);
            }
        }
    }

    #[test]
    fn test_merge_clamps_and_reports_raise() {
        let mut p = RouteProgress::default();
        assert!(p.merge(Route::Genocide, 7));
        assert_eq!(p.get(Route::Genocide), 1);
        assert!(!p.merge(Route::Genocide, 1));
        assert!(!p.merge(Route::Genocide, 0));
        assert!(p.is_done(Route::Genocide));
    }

    #[test]
    fn test_apply_remote_never_lowers() {
        let slot = SlotId(1);
        let mut p = RouteProgress::default();
        assert_eq!(
            p.apply_remote(slot, "1 RoutesDone neutral", &json!(1)),
            Some(Route::Neutral)
        );
        assert_eq!(p.apply_remote(slot, "1 RoutesDone neutral", &json!(0)), None);
        assert_eq!(p.apply_remote(slot, "1 RoutesDone neutral", &Value::Null), None);
        assert!(p.is_done(Route::Neutral));
    }

    #[test]
    fn test_apply_remote_ignores_foreign_keys() {
        let mut p = RouteProgress::default();
        assert_eq!(p.apply_remote(SlotId(1), "2 RoutesDone neutral", &json!(1)), None);
        assert_eq!(p.apply_remote(SlotId(1), "unrelated", &json!(1)), None);
        assert_eq!(p.completed(), 0);
    }

    #[test]
    fn test_all_done_needs_every_route() {
        let mut p = RouteProgress::default();
        p.merge(Route::Neutral, 1);
        p.merge(Route::Pacifist, 1);
        p.merge(Route::Pacifist, 1);
        assert_eq!(p.completed(), 2);
        assert!(!p.all_done());
        p.merge(Route::Genocide, 1);
        assert!(p.all_done());
    }

    #[test]
    fn test_raise_command_shape() {
        let ClientCommand::Set {
            key,
            default,
            want_reply,
            operations,
        } = raise_command(SlotId(2), Route::Neutral)
        else {
            panic!("expected Set");
        };
        assert_eq!(key, "2 RoutesDone neutral");
        assert_eq!(default, json!(0));
        assert!(want_reply);
        assert_eq!(operations, vec![DataStorageOperation::Max(json!(1))]);
    }
}
