//! The synchronization engine: server message handlers and the two
//! polling tick bodies.
//!
//! [`SyncEngine`] is plain synchronous state. It never awaits; the actor
//! in [`crate::actor`] owns it and drives it from one task, so handlers
//! and ticks can never interleave.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use utylink_bridge::{FsBridge, LocalBridge, PeerPosition};
use utylink_protocol::{
    ClientCommand, ClientStatus, Connected, DataPackage, JsonMessagePart, NetworkItem,
    SCOUT_HINT_NEW_ONLY, ServerCommand, SlotId,
};

use crate::SyncError;
use crate::deathlink::DeathLinkCoordinator;
use crate::game::{GAME, HINT_PREVIEW_CHARS, TAG_DEATHLINK, TAG_ONLINE, to_global, to_local};
use crate::items::key_piece_rewards;
use crate::routes::{Route, raise_command, subscribe_commands};
use crate::session::Session;
use crate::tags::TagSet;

/// Where the engine puts outbound batches. Each batch goes out as one
/// frame; sending never blocks.
pub type Outbox = mpsc::UnboundedSender<Vec<ClientCommand>>;

/// A snapshot of engine state, for status output and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub slot: Option<SlotId>,
    pub items_received: usize,
    pub locations_checked: usize,
    pub routes_completed: u8,
    pub finished: bool,
    pub tags: Vec<String>,
    pub interface_dir: PathBuf,
}

/// Owns everything that changes while synchronizing.
pub struct SyncEngine<B: LocalBridge = FsBridge> {
    bridge: B,
    tags: TagSet,
    deathlink: DeathLinkCoordinator,
    session: Option<Session>,
    resync_requested: bool,
    item_names: HashMap<i64, String>,
    outbox: Outbox,
    items_changed: watch::Sender<u64>,
}

impl<B: LocalBridge> SyncEngine<B> {
    pub fn new(bridge: B, tags: TagSet, outbox: Outbox) -> Self {
        let (items_changed, _) = watch::channel(0);
        Self {
            bridge,
            tags,
            deathlink: DeathLinkCoordinator::new(),
            session: None,
            resync_requested: false,
            item_names: HashMap::new(),
            outbox,
            items_changed,
        }
    }

    /// Bumped once for every `ReceivedItems` batch handled in a session,
    /// including out-of-order ones that trigger a resync.
    pub fn items_changed(&self) -> watch::Receiver<u64> {
        self.items_changed.subscribe()
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn status(&self) -> EngineStatus {
        let session = self.session.as_ref();
        EngineStatus {
            slot: session.map(|s| s.slot),
            items_received: session.map_or(0, |s| s.items().len()),
            locations_checked: session.map_or(0, |s| s.checked.len()),
            routes_completed: session.map_or(0, |s| s.routes.completed()),
            finished: session.is_some_and(Session::is_finished),
            tags: self.tags.to_vec(),
            interface_dir: self.bridge.root().to_path_buf(),
        }
    }

    fn send(&self, batch: Vec<ClientCommand>) {
        if batch.is_empty() {
            return;
        }
        if self.outbox.send(batch).is_err() {
            tracing::debug!("outbox closed, dropping batch");
        }
    }

    // ---------------------------------------------------------------------
    // Server messages
    // ---------------------------------------------------------------------

    /// Applies one server command.
    pub fn handle(&mut self, cmd: ServerCommand) -> Result<(), SyncError> {
        tracing::debug!(cmd = cmd.name(), "server command");
        match cmd {
            ServerCommand::Connected(connected) => self.on_connected(&connected),
            ServerCommand::ReceivedItems { index, items } => self.on_received_items(index, items),
            ServerCommand::LocationInfo { locations } => self.on_location_info(&locations),
            ServerCommand::RoomUpdate { checked_locations } => {
                self.on_room_update(checked_locations.unwrap_or_default())
            }
            ServerCommand::Retrieved { keys } => {
                for (key, value) in &keys {
                    self.apply_route_value(key, value);
                }
                Ok(())
            }
            ServerCommand::SetReply { key, value } => {
                self.apply_route_value(&key, &value);
                Ok(())
            }
            ServerCommand::Bounced { tags, data } => self.on_bounced(&tags, &data),
            ServerCommand::DataPackage { data } => {
                self.on_data_package(&data);
                Ok(())
            }
            ServerCommand::PrintJson { data } => {
                log_print_json(&data);
                Ok(())
            }
            ServerCommand::InvalidPacket { text } => {
                tracing::warn!(%text, "server rejected a packet");
                Ok(())
            }
            ServerCommand::RoomInfo(_)
            | ServerCommand::ConnectionRefused { .. }
            | ServerCommand::Unknown => Ok(()),
        }
    }

    fn on_connected(&mut self, connected: &Connected) -> Result<(), SyncError> {
        let session = Session::new(connected);
        tracing::info!(
            slot = %session.slot,
            player = %session.player_name,
            goal = ?session.goal,
            key_pieces = session.key_pieces_needed,
            "session started"
        );
        let subscribe = subscribe_commands(session.slot);
        self.session = Some(session);
        self.send(subscribe);
        self.bridge.ensure_root()?;
        Ok(())
    }

    fn on_received_items(&mut self, index: usize, items: Vec<NetworkItem>) -> Result<(), SyncError> {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!(index, "items received without a session, ignoring");
            return Ok(());
        };

        if index == 0 {
            session.reset_items();
        } else if index != session.items().len() {
            tracing::warn!(
                index,
                held = session.items().len(),
                "item batch out of order, requesting resync"
            );
            let batch = resync_batch(session);
            self.send(batch);
            self.items_changed.send_modify(|n| *n += 1);
            return Ok(());
        }

        let count = items.len();
        for item in items {
            let artifact = session.placer.place(&item);
            self.bridge.write_item(&artifact)?;
            session.push_item(item);
            if session.key_hunt_complete() {
                for reward in key_piece_rewards() {
                    self.bridge.write_item(&reward)?;
                }
            }
        }

        tracing::debug!(index, count, total = session.items().len(), "items materialized");
        self.items_changed.send_modify(|n| *n += 1);
        Ok(())
    }

    fn on_location_info(&mut self, locations: &[NetworkItem]) -> Result<(), SyncError> {
        for hinted in locations {
            let preview: String = self.item_name(hinted.item).chars().take(HINT_PREVIEW_CHARS).collect();
            self.bridge.write_hint(to_local(hinted.location), &preview)?;
        }
        Ok(())
    }

    fn on_room_update(&mut self, checked: Vec<i64>) -> Result<(), SyncError> {
        if checked.is_empty() {
            return Ok(());
        }
        let checked: BTreeSet<i64> = checked.into_iter().collect();
        if let Some(session) = self.session.as_mut() {
            session.checked.extend(&checked);
        }
        let local: Vec<i64> = checked.into_iter().map(to_local).collect();
        self.bridge.append_check_log(&local)?;
        Ok(())
    }

    fn apply_route_value(&mut self, key: &str, value: &Value) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(route) = session.routes.apply_remote(session.slot, key, value) {
            tracing::info!(%route, completed = session.routes.completed(), "route confirmed");
        }
    }

    fn on_bounced(&mut self, tags: &[String], data: &Value) -> Result<(), SyncError> {
        if tags.iter().any(|t| t == TAG_ONLINE) {
            self.on_peer_position(data)?;
        }
        if tags.iter().any(|t| t == TAG_DEATHLINK) {
            if self.tags.deathlink() {
                self.deathlink.on_bounced(data);
            } else {
                tracing::debug!("deathlink off, ignoring death");
            }
        }
        Ok(())
    }

    fn on_peer_position(&mut self, data: &Value) -> Result<(), SyncError> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        if !self.tags.online() {
            return Ok(());
        }
        let Some(player) = data.get("player").and_then(Value::as_u64) else {
            return Ok(());
        };
        if player == u64::from(session.slot.0) {
            return Ok(());
        }
        let Ok(player) = u32::try_from(player) else {
            return Ok(());
        };
        match peer_position(SlotId(player), data) {
            Some(position) => self.bridge.write_peer_position(&position)?,
            None => tracing::debug!(player, "incomplete position bounce, skipping"),
        }
        Ok(())
    }

    fn on_data_package(&mut self, package: &DataPackage) {
        let Some(game) = package.games.get(GAME) else {
            return;
        };
        self.item_names = game
            .item_name_to_id
            .iter()
            .map(|(name, id)| (*id, name.clone()))
            .collect();
        tracing::debug!(items = self.item_names.len(), "item names loaded");
    }

    fn item_name(&self, id: i64) -> String {
        self.item_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("Unknown item (ID:{id})"))
    }

    // ---------------------------------------------------------------------
    // Ticks
    // ---------------------------------------------------------------------

    /// One pass of the item/location watcher. Does nothing without a
    /// session. Commands gathered before an error are still sent.
    pub fn watcher_tick(&mut self) -> Result<(), SyncError> {
        if self.session.is_none() {
            return Ok(());
        }
        let mut out = Vec::new();
        let result = self.watch_once(&mut out);
        self.send(out);
        result
    }

    fn watch_once(&mut self, out: &mut Vec<ClientCommand>) -> Result<(), SyncError> {
        let Self {
            bridge,
            tags,
            deathlink,
            session,
            resync_requested,
            ..
        } = self;
        let Some(session) = session.as_mut() else {
            return Ok(());
        };

        // Flags clear only after their write succeeds.
        if *resync_requested {
            let removed = bridge.clear_items()?;
            *resync_requested = false;
            tracing::info!(removed, "resyncing items");
            out.extend(resync_batch(session));
        }

        if deathlink.is_pending() {
            bridge.write_inbound_death()?;
            deathlink.take_pending();
        }

        let scan = bridge.scan()?;

        if scan.outbound_death && bridge.take_outbound_death()? && tags.deathlink() {
            tracing::info!("death sent");
            out.push(deathlink.outbound(&session.player_name, now_secs()));
        }

        if scan.scout_request {
            let requested: Vec<i64> = bridge
                .take_scout_request()?
                .into_iter()
                .map(to_global)
                .filter(|id| session.server_locations.contains(id))
                .collect();
            if !requested.is_empty() {
                out.push(ClientCommand::LocationScouts {
                    locations: requested,
                    create_as_hint: SCOUT_HINT_NEW_ONLY,
                });
            }
        }

        if scan.check_log {
            let logged: BTreeSet<i64> = bridge.read_check_log()?.into_iter().map(to_global).collect();
            if !logged.is_empty() {
                session.checked.extend(&logged);
                out.push(ClientCommand::LocationChecks {
                    locations: logged.into_iter().collect(),
                });
            }
        }

        if scan.peer_positions > 0 && !tags.online() {
            let removed = bridge.remove_peer_positions()?;
            tracing::debug!(removed, "offline, removed peer positions");
        }

        let raise: Vec<Route> = session.unconfirmed_routes(&scan.victories).collect();
        out.extend(raise.into_iter().map(|route| raise_command(session.slot, route)));

        let reached = session
            .goal
            .as_ref()
            .is_some_and(|goal| goal.is_reached(&scan.victories, &session.routes));
        if reached && session.finish() {
            tracing::info!(slot = %session.slot, "goal reached");
            out.push(ClientCommand::StatusUpdate {
                status: ClientStatus::Goal,
            });
        }

        Ok(())
    }

    /// One pass of the position relay: broadcasts our own position while
    /// online.
    pub fn relay_tick(&mut self) -> Result<(), SyncError> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        if !self.tags.online() {
            return Ok(());
        }
        let Some(position) = self.bridge.read_self_position(session.slot)? else {
            return Ok(());
        };
        self.send(vec![ClientCommand::Bounce {
            games: None,
            slots: None,
            tags: vec![TAG_ONLINE.to_string()],
            data: json!({
                "player": position.player,
                "x": position.x,
                "y": position.y,
                "room": position.room,
                "spr": position.sprite,
                "frm": position.frame,
            }),
        }]);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// About to open a connection.
    pub fn on_connecting(&mut self) -> Result<(), SyncError> {
        self.end_session("connecting")
    }

    /// The connection dropped or was closed.
    pub fn on_session_closed(&mut self) -> Result<(), SyncError> {
        self.end_session("connection closed")
    }

    /// The client is exiting.
    pub fn on_shutdown(&mut self) -> Result<(), SyncError> {
        self.end_session("shutdown")
    }

    /// Drops the session and purges every per-session artifact.
    fn end_session(&mut self, reason: &'static str) -> Result<(), SyncError> {
        if let Some(session) = self.session.take() {
            tracing::info!(slot = %session.slot, reason, "session ended");
        }
        self.deathlink.clear();
        let removed = self.bridge.purge_transient()?;
        tracing::debug!(removed, reason, "interface directory purged");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Operator
    // ---------------------------------------------------------------------

    /// Rebuilds items from scratch on the next watcher tick.
    pub fn request_resync(&mut self) {
        self.resync_requested = true;
    }

    pub fn set_deathlink(&mut self, enabled: bool) {
        self.set_tag(TAG_DEATHLINK, enabled);
    }

    pub fn set_online(&mut self, enabled: bool) {
        self.set_tag(TAG_ONLINE, enabled);
    }

    fn set_tag(&mut self, tag: &str, enabled: bool) {
        if !self.tags.set(tag, enabled) {
            return;
        }
        tracing::info!(tag, enabled, "tag changed");
        if self.session.is_some() {
            self.send(vec![ClientCommand::ConnectUpdate {
                tags: self.tags.to_vec(),
            }]);
        }
    }

    /// Points the bridge at another directory, creating it if a session
    /// is running.
    pub fn set_interface_dir(&mut self, dir: PathBuf) -> Result<(), SyncError> {
        self.bridge.set_root(dir);
        if self.session.is_some() {
            self.bridge.ensure_root()?;
        }
        Ok(())
    }
}

/// `Sync`, plus every known checked location so the server can't miss any.
fn resync_batch(session: &Session) -> Vec<ClientCommand> {
    let mut batch = vec![ClientCommand::Sync];
    if !session.checked.is_empty() {
        batch.push(ClientCommand::LocationChecks {
            locations: session.checked.iter().copied().collect(),
        });
    }
    batch
}

fn peer_position(player: SlotId, data: &Value) -> Option<PeerPosition> {
    let field = |name: &str| -> Option<String> {
        match data.get(name)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    };
    Some(PeerPosition {
        player,
        x: field("x")?,
        y: field("y")?,
        room: field("room")?,
        sprite: field("spr")?,
        frame: field("frm")?,
    })
}

fn log_print_json(parts: &[JsonMessagePart]) {
    let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if !text.is_empty() {
        tracing::info!(target: "utylink::server", "{text}");
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (tempfile::TempDir, SyncEngine, mpsc::UnboundedReceiver<Vec<ClientCommand>>) {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = SyncEngine::new(FsBridge::new(dir.path()), TagSet::default(), tx);
        (dir, engine, rx)
    }

    #[test]
    fn test_ticks_without_session_do_nothing() {
        let (dir, mut engine, mut rx) = engine();
        std::fs::write(dir.path().join("check.spot"), "1\n").unwrap();
        engine.watcher_tick().unwrap();
        engine.relay_tick().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_item_name_fallback() {
        let (_dir, engine, _rx) = engine();
        assert_eq!(engine.item_name(42), "Unknown item (ID:42)");
    }

    #[test]
    fn test_peer_position_accepts_numbers_and_strings() {
        let data = json!({"player": 3, "x": 10, "y": "20\n", "room": "r", "spr": "s", "frm": 0});
        let pos = peer_position(SlotId(3), &data).unwrap();
        assert_eq!(pos.x, "10");
        assert_eq!(pos.y, "20");
        assert!(peer_position(SlotId(3), &json!({"x": 1})).is_none());
    }

    #[test]
    fn test_tag_change_without_session_is_not_sent() {
        let (_dir, mut engine, mut rx) = engine();
        engine.set_deathlink(true);
        assert!(engine.tags().deathlink());
        assert!(rx.try_recv().is_err());
    }
}
