//! Death propagation in both directions.

use serde_json::{Value, json};
use utylink_protocol::ClientCommand;

use crate::game::TAG_DEATHLINK;

/// Holds at most one pending death per direction.
///
/// Inbound deaths raise a flag that the next watcher tick turns into a
/// marker file. Outbound deaths are sent as soon as the game's marker is
/// seen, so only their timestamp is kept, to recognize our own death
/// when the server bounces it back.
#[derive(Debug, Default)]
pub struct DeathLinkCoordinator {
    pending: bool,
    last_sent: Option<f64>,
}

impl DeathLinkCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles the data of a `DeathLink`-tagged bounce. Returns `true` if
    /// a death is now pending.
    pub fn on_bounced(&mut self, data: &Value) -> bool {
        let time = data.get("time").and_then(Value::as_f64);
        if time.is_some() && time == self.last_sent {
            tracing::debug!("ignoring echo of our own death");
            return false;
        }
        let source = data.get("source").and_then(Value::as_str).unwrap_or("someone");
        tracing::info!(%source, "death received");
        self.pending = true;
        true
    }

    /// Consumes the pending inbound death.
    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Builds the bounce for a local death at `time` (epoch seconds) and
    /// remembers it for echo suppression.
    pub fn outbound(&mut self, source: &str, time: f64) -> ClientCommand {
        self.last_sent = Some(time);
        ClientCommand::Bounce {
            games: None,
            slots: None,
            tags: vec![TAG_DEATHLINK.to_string()],
            data: json!({
                "time": time,
                "source": source,
                "cause": format!("{source} died."),
            }),
        }
    }

    /// Drops any pending inbound death.
    pub fn clear(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_death_is_pending_once() {
        let mut dl = DeathLinkCoordinator::new();
        assert!(dl.on_bounced(&json!({"time": 10.5, "source": "Kanako"})));
        assert!(dl.on_bounced(&json!({"time": 11.0, "source": "Kanako"})));
        assert!(dl.take_pending());
        assert!(!dl.take_pending());
    }

    #[test]
    fn test_own_death_echo_is_ignored() {
        let mut dl = DeathLinkCoordinator::new();
        let cmd = dl.outbound("Clover", 1234.25);
        let ClientCommand::Bounce { tags, data, .. } = cmd else {
            panic!("expected Bounce");
        };
        assert_eq!(tags, vec!["DeathLink"]);
        assert_eq!(data["source"], "Clover");

        assert!(!dl.on_bounced(&data));
        assert!(!dl.is_pending());
        assert!(dl.on_bounced(&json!({"time": 1300.0})));
    }

    #[test]
    fn test_death_without_time_still_counts() {
        let mut dl = DeathLinkCoordinator::new();
        assert!(dl.on_bounced(&json!({})));
        dl.clear();
        assert!(!dl.is_pending());
    }
}
