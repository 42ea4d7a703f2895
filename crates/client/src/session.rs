//! The optimistic multiplayer session.
//!
//! A [`Session`] owns the local replica of shared state and a [`Wire`] to
//! the peers. Local intents are validated, applied optimistically with a
//! rollback snapshot, and broadcast; remote messages are routed through the
//! inbound gate and replayed against the same application code. A rejected
//! action, local or remote, restores the snapshot taken for it.

use crate::apply;
use crate::queue::{ActionQueue, QueueDecision};
use crate::rollback::RollbackStack;
use anyhow::Result;
use gridtown_core::{
    Action, ActionId, ActionKind, ActionSource, ActionStatus, BuildingKind, EventBus, GameEvent,
    GameState, GameStatus, Grid, Millis, PlayerId,
};
use gridtown_net::{
    Envelope, Heartbeat, MessageFactory, MessageHandler, MessageRouter, Payload, PendingMessages,
    Wire,
};
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

/// Session state and message handling, separated from the wire so the
/// inbound router can borrow it mutably while the wire sits outside.
struct SessionCore {
    game: GameState,
    grid: Grid,
    local: PlayerId,
    factory: MessageFactory,
    queue: ActionQueue,
    rollback: RollbackStack,
    pending: PendingMessages,
    sent: HashMap<ActionId, String>,
    heartbeat: Heartbeat,
    link_up: bool,
    events: EventBus,
    outbox: Vec<Envelope>,
}

/// A connected game client: local state, optimistic queue, and transport.
pub struct Session<W: Wire> {
    wire: W,
    router: MessageRouter,
    core: SessionCore,
}

impl<W: Wire> Session<W> {
    /// Create a session for `local` over an established wire.
    pub fn new(wire: W, game: GameState, grid: Grid, local: PlayerId) -> Self {
        let factory = MessageFactory::new("client")
            .with_game(game.id.clone())
            .with_player(local.clone());
        Self {
            wire,
            router: MessageRouter::new(),
            core: SessionCore {
                game,
                grid,
                local,
                factory,
                queue: ActionQueue::new(),
                rollback: RollbackStack::new(),
                pending: PendingMessages::new(),
                sent: HashMap::new(),
                heartbeat: Heartbeat::new(Millis::now()),
                link_up: true,
                events: EventBus::new(),
                outbox: Vec::new(),
            },
        }
    }

    /// Current shared state.
    pub fn game(&self) -> &GameState {
        &self.core.game
    }

    /// Current grid.
    pub fn grid(&self) -> &Grid {
        &self.core.grid
    }

    /// This client's player id.
    pub fn local_player(&self) -> &PlayerId {
        &self.core.local
    }

    /// Subscribe to session events.
    pub fn subscribe(&mut self) -> Receiver<GameEvent> {
        self.core.events.subscribe()
    }

    /// Swap in a fresh wire after a reconnect. State, the queue, and
    /// subscriptions carry over; the heartbeat restarts on the new link.
    pub fn set_wire(&mut self, wire: W) {
        self.wire = wire;
        self.core.heartbeat = Heartbeat::new(Millis::now());
        self.core.set_link(true);
    }

    /// Add the local player to the roster and announce them to peers.
    pub async fn announce_join(&mut self, username: impl Into<String>) -> Result<()> {
        let player = gridtown_core::Player::new(self.core.local.clone(), username);
        self.core.game.add_player(player.clone());
        let env = self.core.factory.player_join(player);
        self.wire.send(&env).await
    }

    /// Place a building at the target cell.
    pub async fn place_building(
        &mut self,
        row: u16,
        col: u16,
        building: BuildingKind,
    ) -> Result<ActionId> {
        let id = self.core.submit_local(ActionKind::PlaceBuilding { row, col, building });
        self.flush().await?;
        id
    }

    /// Remove an owned building at the target cell.
    pub async fn remove_building(&mut self, row: u16, col: u16) -> Result<ActionId> {
        let id = self.core.submit_local(ActionKind::RemoveBuilding { row, col });
        self.flush().await?;
        id
    }

    /// Yield the active turn.
    pub async fn end_turn(&mut self) -> Result<ActionId> {
        let id = self.core.submit_local(ActionKind::EndTurn);
        self.flush().await?;
        id
    }

    /// Send a chat line.
    pub async fn send_chat(&mut self, text: impl Into<String>) -> Result<()> {
        let env = self.core.factory.chat(self.core.local.clone(), text);
        self.wire.send(&env).await
    }

    /// Ask peers for a full grid sync.
    pub async fn request_map_sync(&mut self) -> Result<()> {
        let env = self.core.factory.map_sync_request(None);
        self.wire.send(&env).await
    }

    /// Receive and process one inbound message. Returns `false` once the
    /// peer has closed cleanly.
    pub async fn pump(&mut self) -> Result<bool> {
        match self.wire.recv().await? {
            Some(envelope) => {
                let value = serde_json::to_value(&envelope)?;
                self.router.process(&value, &mut self.core);
                self.flush().await?;
                Ok(true)
            }
            None => {
                info!("peer closed the connection");
                self.core.set_link(false);
                Ok(false)
            }
        }
    }

    /// Periodic maintenance: heartbeat pings and pending-message expiry.
    pub async fn tick(&mut self, now: Millis) -> Result<()> {
        self.core.tick(now);
        self.flush().await
    }

    /// Send everything the core queued for the wire.
    async fn flush(&mut self) -> Result<()> {
        for env in std::mem::take(&mut self.core.outbox) {
            self.wire.send(&env).await?;
        }
        Ok(())
    }
}

impl SessionCore {
    /// Run a local intent through the queue and, when admitted, apply it
    /// optimistically under a rollback snapshot and broadcast it.
    fn submit_local(&mut self, kind: ActionKind) -> Result<ActionId> {
        let id = self.game.next_action_id();
        let action = Action::new(id, self.local.clone(), kind, Millis::now(), ActionSource::Local);

        match self.queue.submit(action, &self.game, &self.grid) {
            QueueDecision::Apply { action, displaced } => {
                for loser in displaced {
                    self.undo_displaced(loser, "Preempted by an earlier claim".to_string());
                }
                self.apply_and_broadcast(action)?;
                Ok(id)
            }
            QueueDecision::Parked(action) => {
                debug!(id = %action.id, "action parked until turn");
                self.events.emit(GameEvent::ActionQueued(action));
                Ok(id)
            }
            QueueDecision::Rejected { action, reason } => {
                self.events.emit(GameEvent::ActionRejected {
                    action,
                    reason: reason.clone(),
                });
                anyhow::bail!(reason)
            }
        }
    }

    /// Optimistically apply an admitted local action and queue its
    /// broadcast. On apply failure the snapshot is restored immediately.
    fn apply_and_broadcast(&mut self, mut action: Action) -> Result<()> {
        self.rollback.push(action.id, &self.game, &self.grid);
        match apply::apply(&mut self.game, &mut self.grid, &action) {
            Ok(()) => {
                action.transition(ActionStatus::Applied);
                self.events.emit(GameEvent::PlayerAction(action.clone()));
                self.broadcast(&action);
                // only building actions are acknowledged; everything else
                // settles the moment it is sent
                if !matches!(
                    action.kind,
                    ActionKind::PlaceBuilding { .. } | ActionKind::RemoveBuilding { .. }
                ) {
                    self.queue.settle(action.id);
                    self.rollback.confirm(action.id);
                }
                if matches!(action.kind, ActionKind::EndTurn) {
                    self.release_parked();
                }
                Ok(())
            }
            Err(err) => {
                if let Some(point) = self.rollback.take(action.id) {
                    self.game = point.game;
                    self.grid = point.grid;
                }
                self.queue.settle(action.id);
                action.transition(ActionStatus::Failed);
                let reason = err.to_string();
                self.events.emit(GameEvent::ActionRejected {
                    action,
                    reason: reason.clone(),
                });
                anyhow::bail!(reason)
            }
        }
    }

    /// Queue the wire message announcing an applied local action.
    fn broadcast(&mut self, action: &Action) {
        let env = match &action.kind {
            ActionKind::PlaceBuilding { row, col, building } => self.factory.place_building(
                action.id,
                action.player.clone(),
                *row,
                *col,
                *building,
                action.timestamp,
            ),
            ActionKind::RemoveBuilding { row, col } => self.factory.remove_building(
                action.id,
                action.player.clone(),
                *row,
                *col,
                action.timestamp,
            ),
            ActionKind::UpdateResources { deltas } => {
                let env = self.factory.resource_update(
                    action.player.clone(),
                    deltas
                        .iter()
                        .map(|&(resource, amount)| gridtown_net::ResourceDelta { resource, amount })
                        .collect(),
                );
                // state broadcast, no acknowledgement expected
                self.outbox.push(env);
                return;
            }
            ActionKind::EndTurn => {
                // turn changes need no acknowledgement
                if let Some(player) = self.game.current_player().cloned() {
                    let env = self.factory.turn_change(self.game.current_turn, player);
                    self.outbox.push(env);
                }
                return;
            }
        };
        self.sent.insert(action.id, env.id.clone());
        self.pending.track(env.clone());
        self.outbox.push(env);
    }

    /// Roll back a displaced action already removed from the queue.
    fn undo_displaced(&mut self, loser: Action, reason: String) {
        self.restore_and_replay(loser.id);
        if let Some(msg_id) = self.sent.remove(&loser.id) {
            self.pending.settle(&msg_id);
        }
        warn!(id = %loser.id, %reason, "rolled back displaced action");
        self.events.emit(GameEvent::ActionRejected {
            action: loser,
            reason,
        });
    }

    /// Roll back an optimistic local action and report it rejected.
    fn undo_local(&mut self, id: ActionId, reason: String) {
        let Some(mut action) = self.queue.settle(id) else {
            return;
        };
        self.restore_and_replay(id);
        if let Some(msg_id) = self.sent.remove(&id) {
            self.pending.settle(&msg_id);
        }
        action.transition(ActionStatus::Rejected);
        warn!(%id, %reason, "rolled back local action");
        self.events.emit(GameEvent::ActionRejected { action, reason });
    }

    /// Restore the snapshot guarding `id`, then rebuild the effects of the
    /// in-flight actions applied after it. Without the replay, restoring an
    /// older snapshot would silently erase every later optimistic action
    /// that peers already saw. When no snapshot remains (evicted, or a
    /// later action was already confirmed), fall back to a full map sync.
    fn restore_and_replay(&mut self, id: ActionId) {
        let survivors = self.rollback.later_than(id);
        match self.rollback.take(id) {
            Some(point) => {
                self.game = point.game;
                self.grid = point.grid;
                self.replay_survivors(&survivors);
            }
            None => {
                warn!(%id, "no snapshot left to restore, requesting a map sync");
                self.outbox.push(self.factory.map_sync_request(None));
            }
        }
    }

    /// Re-apply in-flight actions whose snapshots a rollback discarded,
    /// in their original order. A survivor that no longer applies on the
    /// restored state is rejected like any other failed action.
    fn replay_survivors(&mut self, ids: &[ActionId]) {
        for &id in ids {
            let Some(action) = self.queue.in_flight().iter().find(|a| a.id == id).cloned()
            else {
                continue;
            };
            self.rollback.push(id, &self.game, &self.grid);
            if let Err(err) = apply::apply(&mut self.game, &mut self.grid, &action) {
                self.rollback.take(id);
                if let Some(msg_id) = self.sent.remove(&id) {
                    self.pending.settle(&msg_id);
                }
                if let Some(mut lost) = self.queue.settle(id) {
                    lost.transition(ActionStatus::Rejected);
                    self.events.emit(GameEvent::ActionRejected {
                        action: lost,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    /// Sweep the parked queue after any turn change, applying whatever is
    /// now eligible.
    fn release_parked(&mut self) {
        let swept = self.queue.on_turn_change(&self.game);
        for action in swept.abandoned {
            let reason = "Out of retries".to_string();
            self.events.emit(GameEvent::ActionRejected { action, reason });
        }
        for action in swept.released {
            if let Err(err) = self.apply_and_broadcast(action) {
                debug!(%err, "released action failed to apply");
            }
        }
    }

    /// Replay a remote building action, resolving cell contention against
    /// local in-flight actions with the deterministic priority key. No turn
    /// gate here: the originator was gated on its own client, and streams
    /// carry no ordering, so an action released by a turn change can arrive
    /// before the turn change itself.
    fn replay_remote(&mut self, mut action: Action) {
        if let Some(target) = action.kind.target() {
            if let Some(local) = self.queue.contesting(target) {
                let local_id = local.id;
                if local.priority_key() <= action.priority_key() {
                    // local claim stands; refuse the remote one
                    self.events.emit(GameEvent::ConflictDetected {
                        action_id: action.id,
                        conflicts: vec![gridtown_core::Conflict {
                            kind: gridtown_core::ConflictKind::Cell {
                                row: target.0,
                                col: target.1,
                                with: local_id,
                            },
                        }],
                    });
                    self.respond(
                        action.id,
                        false,
                        Some(format!("Cell ({}, {}) already claimed", target.0, target.1)),
                    );
                    return;
                }
                // remote claim is earlier; our optimistic apply loses
                self.undo_local(local_id, "Lost the cell to an earlier claim".to_string());
            }
        }

        match apply::apply(&mut self.game, &mut self.grid, &action) {
            Ok(()) => {
                action.transition(ActionStatus::Applied);
                self.events.emit(GameEvent::PlayerAction(action.clone()));
                self.respond(action.id, true, None);
            }
            Err(err) => {
                self.respond(action.id, false, Some(err.to_string()));
            }
        }
    }

    /// Queue an action response to the peer.
    fn respond(&mut self, action_id: ActionId, accepted: bool, reason: Option<String>) {
        let env = self.factory.action_response(action_id, accepted, reason);
        self.outbox.push(env);
    }

    /// Record link state, emitting the change only on transitions.
    fn set_link(&mut self, connected: bool) {
        if self.link_up != connected {
            self.link_up = connected;
            self.events.emit(GameEvent::ConnectionChanged { connected });
        }
    }

    /// Move the session status, emitting the change.
    fn set_status(&mut self, next: GameStatus) {
        if self.game.status != next {
            let previous = self.game.status;
            self.game.status = next;
            self.events.emit(GameEvent::StateChanged {
                status: next,
                previous,
            });
        }
    }

    /// Periodic maintenance against the given clock.
    fn tick(&mut self, now: Millis) {
        if self.heartbeat.ping_due(now) {
            self.outbox.push(self.factory.ping(now));
            self.heartbeat.mark_ping(now);
        }
        if self.heartbeat.is_stale(now) {
            if self.link_up {
                warn!("no heartbeat response in two intervals");
            }
            self.set_link(false);
        }
        for lost in self.pending.sweep(now) {
            if let Some(action_id) = action_of(&lost) {
                self.sent.remove(&action_id);
                self.undo_local(action_id, "No response from peers".to_string());
            }
        }
    }
}

/// The action an outbound envelope announced, if any.
fn action_of(envelope: &Envelope) -> Option<ActionId> {
    match &envelope.payload {
        Payload::PlaceBuilding(msg) => Some(msg.action_id),
        Payload::RemoveBuilding(msg) => Some(msg.action_id),
        _ => None,
    }
}

impl MessageHandler for SessionCore {
    fn handle(&mut self, envelope: &Envelope) -> Result<()> {
        match &envelope.payload {
            Payload::PlaceBuilding(msg) => {
                let action = Action::new(
                    msg.action_id,
                    msg.player_id.clone(),
                    ActionKind::PlaceBuilding {
                        row: msg.row,
                        col: msg.col,
                        building: msg.building,
                    },
                    msg.issued_at,
                    ActionSource::Remote,
                );
                self.replay_remote(action);
            }
            Payload::RemoveBuilding(msg) => {
                let action = Action::new(
                    msg.action_id,
                    msg.player_id.clone(),
                    ActionKind::RemoveBuilding {
                        row: msg.row,
                        col: msg.col,
                    },
                    msg.issued_at,
                    ActionSource::Remote,
                );
                self.replay_remote(action);
            }
            Payload::ActionResponse(msg) => {
                if let Some(msg_id) = self.sent.remove(&msg.action_id) {
                    self.pending.settle(&msg_id);
                }
                if msg.accepted {
                    self.rollback.confirm(msg.action_id);
                    self.queue.settle(msg.action_id);
                } else {
                    let reason = msg
                        .reason
                        .clone()
                        .unwrap_or_else(|| "Rejected by peer".to_string());
                    self.undo_local(msg.action_id, reason);
                }
            }
            Payload::ResourceUpdate(msg) => {
                if let Some(player) = self.game.players.get_mut(&msg.player_id) {
                    for delta in &msg.deltas {
                        player.resources.apply_delta(delta.resource, delta.amount);
                    }
                }
            }
            Payload::ResourceGeneration(msg) => {
                if let Some(player) = self.game.players.get_mut(&msg.player_id) {
                    for delta in &msg.yields {
                        player.resources.apply_delta(delta.resource, delta.amount);
                    }
                }
            }
            Payload::MapUpdate(msg) => {
                for cell in &msg.cells {
                    self.ingest_if_newer(cell.clone());
                }
            }
            Payload::MapSyncRequest(msg) => {
                let cells: Vec<_> = self
                    .grid
                    .cells()
                    .filter(|c| msg.since.map_or(true, |since| c.stamp > since))
                    .cloned()
                    .collect();
                let env = self.factory.map_sync_response(cells);
                self.outbox.push(env);
            }
            Payload::MapSyncResponse(msg) => {
                for cell in &msg.cells {
                    self.ingest_if_newer(cell.clone());
                }
            }
            Payload::PlayerJoin(msg) => {
                info!(player = %msg.player.id, "player joined");
                self.game.add_player(msg.player.clone());
            }
            Payload::PlayerLeave(msg) => {
                info!(player = %msg.player_id, "player left");
                self.game.remove_player(&msg.player_id);
            }
            Payload::PlayerReady(msg) => {
                if let Some(player) = self.game.players.get_mut(&msg.player_id) {
                    player.is_ready = msg.ready;
                }
            }
            Payload::TurnChange(msg) => {
                if msg.current_turn < self.game.turn_order.len() {
                    self.game.current_turn = msg.current_turn;
                }
                self.release_parked();
            }
            Payload::GameStart(msg) => {
                self.game.turn_order = msg.turn_order.clone();
                self.game.current_turn = 0;
                self.set_status(GameStatus::Active);
            }
            Payload::GameEnd(msg) => {
                self.apply_scores(&msg.scores);
                self.set_status(GameStatus::Finished);
            }
            Payload::Victory(msg) => {
                info!(winner = %msg.winner, "game won");
                self.apply_scores(&msg.scores);
                self.set_status(GameStatus::Finished);
            }
            Payload::GamePause(_) => self.set_status(GameStatus::Paused),
            Payload::GameResume(_) => self.set_status(GameStatus::Active),
            Payload::ChatMessage(msg) => {
                self.events.emit(GameEvent::Chat {
                    from: msg.player_id.clone(),
                    text: msg.text.clone(),
                });
            }
            Payload::Ping(_) => {
                if let Some(pong) = Heartbeat::answer(&self.factory, envelope) {
                    self.outbox.push(pong);
                }
            }
            Payload::Pong(msg) => {
                self.heartbeat.mark_pong(msg.echo, Millis::now());
                self.set_link(true);
            }
            Payload::Error(msg) => {
                warn!(code = %msg.code, message = %msg.message, "peer reported an error");
            }
            // the router flattens batches before dispatch
            Payload::Batch(_) => {}
        }
        Ok(())
    }
}

impl SessionCore {
    /// Last-write-wins cell ingest keyed on the mutation stamp.
    fn ingest_if_newer(&mut self, cell: gridtown_core::Cell) {
        let newer = self
            .grid
            .get(cell.row, cell.col)
            .map(|existing| cell.stamp >= existing.stamp)
            .unwrap_or(false);
        if newer {
            self.grid.ingest(cell);
        }
    }

    fn apply_scores(&mut self, scores: &[(PlayerId, i64)]) {
        for (id, score) in scores {
            if let Some(player) = self.game.players.get_mut(id) {
                player.score = *score;
            }
        }
    }
}
