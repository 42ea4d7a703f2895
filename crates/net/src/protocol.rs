//! Versioned envelope protocol for game synchronization.
//!
//! Every message on the wire is an [`Envelope`]: a common header (id, type,
//! timestamp, version, metadata) around a type-specific payload. The catalog
//! of message types is fixed; anything outside it fails validation.

use crate::ident::MessageIdGen;
use gridtown_core::{
    ActionId, BuildingKind, Cell, Millis, Player, PlayerId, ResourceKind, MAP_SIZE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire protocol version carried in every envelope.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Maximum length of a chat message (characters).
pub const MAX_CHAT_LEN: usize = 256;

/// Maximum length of a username or display string.
pub const MAX_NAME_LEN: usize = 32;

/// Maximum sub-messages inside one batch envelope.
pub const MAX_BATCH_LEN: usize = 32;

/// Maximum cells in a map sync/update payload (the full grid).
pub const MAX_SYNC_CELLS: usize = MAP_SIZE * MAP_SIZE;

/// Maximum resource delta lines in one update.
pub const MAX_RESOURCE_DELTAS: usize = 8;

/// The fixed message-type catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A player placed a building.
    PlaceBuilding,
    /// A player removed a building.
    RemoveBuilding,
    /// Authoritative accept/reject of a prior action.
    ActionResponse,
    /// Signed resource adjustments for a player.
    ResourceUpdate,
    /// Periodic production yields for a player.
    ResourceGeneration,
    /// Incremental cell patches.
    MapUpdate,
    /// Request a full grid sync.
    MapSyncRequest,
    /// Full grid sync reply.
    MapSyncResponse,
    /// A player joined the room.
    PlayerJoin,
    /// A player left the room.
    PlayerLeave,
    /// A player toggled ready.
    PlayerReady,
    /// The active turn moved.
    TurnChange,
    /// The game started.
    GameStart,
    /// The game ended.
    GameEnd,
    /// A player won.
    Victory,
    /// The game paused.
    GamePause,
    /// The game resumed.
    GameResume,
    /// Chat line.
    ChatMessage,
    /// Liveness probe.
    Ping,
    /// Liveness reply.
    Pong,
    /// Peer-reported error.
    Error,
    /// Ordered bundle of sub-messages.
    Batch,
}

impl MessageType {
    /// Every type in the catalog, in wire order.
    pub const CATALOG: [MessageType; 22] = [
        MessageType::PlaceBuilding,
        MessageType::RemoveBuilding,
        MessageType::ActionResponse,
        MessageType::ResourceUpdate,
        MessageType::ResourceGeneration,
        MessageType::MapUpdate,
        MessageType::MapSyncRequest,
        MessageType::MapSyncResponse,
        MessageType::PlayerJoin,
        MessageType::PlayerLeave,
        MessageType::PlayerReady,
        MessageType::TurnChange,
        MessageType::GameStart,
        MessageType::GameEnd,
        MessageType::Victory,
        MessageType::GamePause,
        MessageType::GameResume,
        MessageType::ChatMessage,
        MessageType::Ping,
        MessageType::Pong,
        MessageType::Error,
        MessageType::Batch,
    ];

    /// Wire name of this type.
    pub fn as_wire(self) -> &'static str {
        match self {
            MessageType::PlaceBuilding => "place_building",
            MessageType::RemoveBuilding => "remove_building",
            MessageType::ActionResponse => "action_response",
            MessageType::ResourceUpdate => "resource_update",
            MessageType::ResourceGeneration => "resource_generation",
            MessageType::MapUpdate => "map_update",
            MessageType::MapSyncRequest => "map_sync_request",
            MessageType::MapSyncResponse => "map_sync_response",
            MessageType::PlayerJoin => "player_join",
            MessageType::PlayerLeave => "player_leave",
            MessageType::PlayerReady => "player_ready",
            MessageType::TurnChange => "turn_change",
            MessageType::GameStart => "game_start",
            MessageType::GameEnd => "game_end",
            MessageType::Victory => "victory",
            MessageType::GamePause => "game_pause",
            MessageType::GameResume => "game_resume",
            MessageType::ChatMessage => "chat_message",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Error => "error",
            MessageType::Batch => "batch",
        }
    }

    /// Parse a wire name; `None` for anything outside the catalog.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::CATALOG.iter().copied().find(|t| t.as_wire() == name)
    }
}

/// One signed resource adjustment line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDelta {
    /// Resource being adjusted.
    pub resource: ResourceKind,
    /// Signed amount.
    pub amount: i64,
}

/// Payload of a `place_building` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceBuildingMsg {
    /// Originating action id on the acting client.
    pub action_id: ActionId,
    /// Acting player.
    pub player_id: PlayerId,
    /// Target row.
    pub row: u16,
    /// Target column.
    pub col: u16,
    /// Building placed.
    pub building: BuildingKind,
    /// Action creation time on the acting client; conflict tie-break input.
    pub issued_at: Millis,
}

/// Payload of a `remove_building` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveBuildingMsg {
    /// Originating action id on the acting client.
    pub action_id: ActionId,
    /// Acting player.
    pub player_id: PlayerId,
    /// Target row.
    pub row: u16,
    /// Target column.
    pub col: u16,
    /// Action creation time on the acting client.
    pub issued_at: Millis,
}

/// Payload of an `action_response` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponseMsg {
    /// Action being answered.
    pub action_id: ActionId,
    /// Whether the action stands.
    pub accepted: bool,
    /// Rejection reason when not accepted.
    pub reason: Option<String>,
    /// Slot for an authoritative ordering sequence; unused until a server
    /// assigns one, carried so adding it later is not a wire break.
    pub sequence: Option<u64>,
}

/// Payload of a `resource_update` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUpdateMsg {
    /// Player whose balances change.
    pub player_id: PlayerId,
    /// Adjustments to apply in order.
    pub deltas: Vec<ResourceDelta>,
}

/// Payload of a `resource_generation` message: periodic production yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGenerationMsg {
    /// Player receiving the yields.
    pub player_id: PlayerId,
    /// Produced amounts (non-negative by convention).
    pub yields: Vec<ResourceDelta>,
}

/// Payload of a `map_update` message: incremental cell patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapUpdateMsg {
    /// Replaced cell records.
    pub cells: Vec<Cell>,
}

/// Payload of a `map_sync_request` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSyncRequestMsg {
    /// Only cells stamped after this time are needed, when set.
    pub since: Option<Millis>,
}

/// Payload of a `map_sync_response` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSyncResponseMsg {
    /// Cell records to ingest.
    pub cells: Vec<Cell>,
}

/// Payload of a `player_join` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoinMsg {
    /// The joining player's full record.
    pub player: Player,
}

/// Payload of a `player_leave` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLeaveMsg {
    /// The departing player.
    pub player_id: PlayerId,
}

/// Payload of a `player_ready` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerReadyMsg {
    /// The player toggling readiness.
    pub player_id: PlayerId,
    /// New ready flag.
    pub ready: bool,
}

/// Payload of a `turn_change` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnChangeMsg {
    /// New index into the turn order.
    pub current_turn: usize,
    /// Player now holding the turn.
    pub player_id: PlayerId,
}

/// Payload of a `game_start` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStartMsg {
    /// Authoritative turn rotation.
    pub turn_order: Vec<PlayerId>,
}

/// Payload of a `game_end` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEndMsg {
    /// Final scores per player.
    pub scores: Vec<(PlayerId, i64)>,
}

/// Payload of a `victory` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VictoryMsg {
    /// Winning player.
    pub winner: PlayerId,
    /// Final scores per player.
    pub scores: Vec<(PlayerId, i64)>,
}

/// Payload of a `game_pause` message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GamePauseMsg {}

/// Payload of a `game_resume` message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameResumeMsg {}

/// Payload of a `chat_message` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMsg {
    /// Sender.
    pub player_id: PlayerId,
    /// Message text.
    pub text: String,
}

/// Payload of a `ping` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingMsg {
    /// Send time, echoed back in the pong.
    pub sent_at: Millis,
}

/// Payload of a `pong` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongMsg {
    /// The ping's `sent_at`, echoed verbatim.
    pub echo: Millis,
}

/// Payload of an `error` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMsg {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Payload of a `batch` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMsg {
    /// Sub-messages, processed in order.
    pub messages: Vec<Envelope>,
}

/// Type-specific payload, adjacently tagged so the wire shape is the
/// original `{ "type": ..., "data": ... }` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// See [`PlaceBuildingMsg`].
    PlaceBuilding(PlaceBuildingMsg),
    /// See [`RemoveBuildingMsg`].
    RemoveBuilding(RemoveBuildingMsg),
    /// See [`ActionResponseMsg`].
    ActionResponse(ActionResponseMsg),
    /// See [`ResourceUpdateMsg`].
    ResourceUpdate(ResourceUpdateMsg),
    /// See [`ResourceGenerationMsg`].
    ResourceGeneration(ResourceGenerationMsg),
    /// See [`MapUpdateMsg`].
    MapUpdate(MapUpdateMsg),
    /// See [`MapSyncRequestMsg`].
    MapSyncRequest(MapSyncRequestMsg),
    /// See [`MapSyncResponseMsg`].
    MapSyncResponse(MapSyncResponseMsg),
    /// See [`PlayerJoinMsg`].
    PlayerJoin(PlayerJoinMsg),
    /// See [`PlayerLeaveMsg`].
    PlayerLeave(PlayerLeaveMsg),
    /// See [`PlayerReadyMsg`].
    PlayerReady(PlayerReadyMsg),
    /// See [`TurnChangeMsg`].
    TurnChange(TurnChangeMsg),
    /// See [`GameStartMsg`].
    GameStart(GameStartMsg),
    /// See [`GameEndMsg`].
    GameEnd(GameEndMsg),
    /// See [`VictoryMsg`].
    Victory(VictoryMsg),
    /// See [`GamePauseMsg`].
    GamePause(GamePauseMsg),
    /// See [`GameResumeMsg`].
    GameResume(GameResumeMsg),
    /// See [`ChatMsg`].
    ChatMessage(ChatMsg),
    /// See [`PingMsg`].
    Ping(PingMsg),
    /// See [`PongMsg`].
    Pong(PongMsg),
    /// See [`ErrorMsg`].
    Error(ErrorMsg),
    /// See [`BatchMsg`].
    Batch(BatchMsg),
}

impl Payload {
    /// Catalog type of this payload.
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::PlaceBuilding(_) => MessageType::PlaceBuilding,
            Payload::RemoveBuilding(_) => MessageType::RemoveBuilding,
            Payload::ActionResponse(_) => MessageType::ActionResponse,
            Payload::ResourceUpdate(_) => MessageType::ResourceUpdate,
            Payload::ResourceGeneration(_) => MessageType::ResourceGeneration,
            Payload::MapUpdate(_) => MessageType::MapUpdate,
            Payload::MapSyncRequest(_) => MessageType::MapSyncRequest,
            Payload::MapSyncResponse(_) => MessageType::MapSyncResponse,
            Payload::PlayerJoin(_) => MessageType::PlayerJoin,
            Payload::PlayerLeave(_) => MessageType::PlayerLeave,
            Payload::PlayerReady(_) => MessageType::PlayerReady,
            Payload::TurnChange(_) => MessageType::TurnChange,
            Payload::GameStart(_) => MessageType::GameStart,
            Payload::GameEnd(_) => MessageType::GameEnd,
            Payload::Victory(_) => MessageType::Victory,
            Payload::GamePause(_) => MessageType::GamePause,
            Payload::GameResume(_) => MessageType::GameResume,
            Payload::ChatMessage(_) => MessageType::ChatMessage,
            Payload::Ping(_) => MessageType::Ping,
            Payload::Pong(_) => MessageType::Pong,
            Payload::Error(_) => MessageType::Error,
            Payload::Batch(_) => MessageType::Batch,
        }
    }
}

/// Routing metadata carried by every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Emitting subsystem (client name).
    pub source: String,
    /// Game session, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    /// Acting player, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
}

/// A complete wire message: common header plus typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message id, `msg_<epoch-ms>_<counter>_<salt>`.
    pub id: String,
    /// Creation time, epoch milliseconds; must be positive.
    pub timestamp: Millis,
    /// Protocol version string.
    pub version: String,
    /// Routing metadata.
    pub metadata: Metadata,
    /// Typed payload, flattened to `type`/`data` on the wire.
    #[serde(flatten)]
    pub payload: Payload,
}

/// Why a raw message failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The value is not a JSON object.
    #[error("message is not a JSON object")]
    NotAnObject,
    /// A required envelope field is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// A required field has the wrong JSON type.
    #[error("field has wrong type: {0}")]
    WrongFieldType(&'static str),
    /// The `type` field names something outside the catalog.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// The timestamp is missing, non-numeric, or not positive.
    #[error("timestamp must be a positive number")]
    BadTimestamp,
}

impl Envelope {
    /// Catalog type of this envelope.
    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Validate a raw JSON value against the envelope contract before any
    /// typed deserialization: required fields `{id, type, timestamp,
    /// version, data}` present, `type` in the catalog, timestamp positive.
    ///
    /// Always returns, never panics; malformed input is a normal outcome.
    pub fn validate_value(value: &Value) -> Result<(), ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let id = obj.get("id").ok_or(ValidationError::MissingField("id"))?;
        if !id.is_string() {
            return Err(ValidationError::WrongFieldType("id"));
        }

        let kind = obj
            .get("type")
            .ok_or(ValidationError::MissingField("type"))?;
        let kind = kind
            .as_str()
            .ok_or(ValidationError::WrongFieldType("type"))?;
        if MessageType::from_wire(kind).is_none() {
            return Err(ValidationError::UnknownType(kind.to_string()));
        }

        match obj.get("timestamp") {
            Some(ts) => match ts.as_u64() {
                Some(ms) if ms > 0 => {}
                _ => return Err(ValidationError::BadTimestamp),
            },
            None => return Err(ValidationError::MissingField("timestamp")),
        }

        let version = obj
            .get("version")
            .ok_or(ValidationError::MissingField("version"))?;
        if !version.is_string() {
            return Err(ValidationError::WrongFieldType("version"));
        }

        if !obj.contains_key("data") {
            return Err(ValidationError::MissingField("data"));
        }

        Ok(())
    }

    /// Verify payload size limits. Called on every received message so a
    /// hostile peer cannot force unbounded allocation or recursion.
    pub fn verify(&self) -> Result<(), &'static str> {
        match &self.payload {
            Payload::ChatMessage(chat) => {
                if chat.text.len() > MAX_CHAT_LEN {
                    return Err("Chat message too long");
                }
            }
            Payload::PlayerJoin(join) => {
                if join.player.username.len() > MAX_NAME_LEN {
                    return Err("Username too long");
                }
            }
            Payload::MapUpdate(update) => {
                if update.cells.len() > MAX_SYNC_CELLS {
                    return Err("Too many cells in map update");
                }
            }
            Payload::MapSyncResponse(sync) => {
                if sync.cells.len() > MAX_SYNC_CELLS {
                    return Err("Too many cells in map sync");
                }
            }
            Payload::ResourceUpdate(update) => {
                if update.deltas.len() > MAX_RESOURCE_DELTAS {
                    return Err("Too many resource deltas");
                }
            }
            Payload::ResourceGeneration(generation) => {
                if generation.yields.len() > MAX_RESOURCE_DELTAS {
                    return Err("Too many resource yields");
                }
            }
            Payload::Error(err) => {
                if err.message.len() > MAX_CHAT_LEN {
                    return Err("Error message too long");
                }
            }
            Payload::Batch(batch) => {
                if batch.messages.len() > MAX_BATCH_LEN {
                    return Err("Too many messages in batch");
                }
                for sub in &batch.messages {
                    if matches!(sub.payload, Payload::Batch(_)) {
                        return Err("Nested batch not allowed");
                    }
                    sub.verify()?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Builds envelopes with a shared id generator and default metadata.
pub struct MessageFactory {
    ids: MessageIdGen,
    source: String,
    game_id: Option<String>,
    player_id: Option<PlayerId>,
}

impl MessageFactory {
    /// Create a factory emitting messages tagged with `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            ids: MessageIdGen::new(),
            source: source.into(),
            game_id: None,
            player_id: None,
        }
    }

    /// Attach a default game id to every envelope.
    pub fn with_game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    /// Attach a default player id to every envelope.
    pub fn with_player(mut self, player_id: PlayerId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    /// Wrap a payload in a fresh envelope.
    pub fn envelope(&self, payload: Payload) -> Envelope {
        Envelope {
            id: self.ids.next_id(),
            timestamp: Millis::now(),
            version: PROTOCOL_VERSION.to_string(),
            metadata: Metadata {
                source: self.source.clone(),
                game_id: self.game_id.clone(),
                player_id: self.player_id.clone(),
            },
            payload,
        }
    }

    /// Place-building broadcast.
    pub fn place_building(
        &self,
        action_id: ActionId,
        player_id: PlayerId,
        row: u16,
        col: u16,
        building: BuildingKind,
        issued_at: Millis,
    ) -> Envelope {
        self.envelope(Payload::PlaceBuilding(PlaceBuildingMsg {
            action_id,
            player_id,
            row,
            col,
            building,
            issued_at,
        }))
    }

    /// Remove-building broadcast.
    pub fn remove_building(
        &self,
        action_id: ActionId,
        player_id: PlayerId,
        row: u16,
        col: u16,
        issued_at: Millis,
    ) -> Envelope {
        self.envelope(Payload::RemoveBuilding(RemoveBuildingMsg {
            action_id,
            player_id,
            row,
            col,
            issued_at,
        }))
    }

    /// Accept/reject reply to a peer action.
    pub fn action_response(
        &self,
        action_id: ActionId,
        accepted: bool,
        reason: Option<String>,
    ) -> Envelope {
        self.envelope(Payload::ActionResponse(ActionResponseMsg {
            action_id,
            accepted,
            reason,
            sequence: None,
        }))
    }

    /// Resource adjustment broadcast.
    pub fn resource_update(&self, player_id: PlayerId, deltas: Vec<ResourceDelta>) -> Envelope {
        self.envelope(Payload::ResourceUpdate(ResourceUpdateMsg {
            player_id,
            deltas,
        }))
    }

    /// Periodic production yield broadcast.
    pub fn resource_generation(
        &self,
        player_id: PlayerId,
        yields: Vec<ResourceDelta>,
    ) -> Envelope {
        self.envelope(Payload::ResourceGeneration(ResourceGenerationMsg {
            player_id,
            yields,
        }))
    }

    /// Incremental map patch.
    pub fn map_update(&self, cells: Vec<Cell>) -> Envelope {
        self.envelope(Payload::MapUpdate(MapUpdateMsg { cells }))
    }

    /// Ask a peer for the full grid.
    pub fn map_sync_request(&self, since: Option<Millis>) -> Envelope {
        self.envelope(Payload::MapSyncRequest(MapSyncRequestMsg { since }))
    }

    /// Answer a grid sync request.
    pub fn map_sync_response(&self, cells: Vec<Cell>) -> Envelope {
        self.envelope(Payload::MapSyncResponse(MapSyncResponseMsg { cells }))
    }

    /// Player join announcement.
    pub fn player_join(&self, player: Player) -> Envelope {
        self.envelope(Payload::PlayerJoin(PlayerJoinMsg { player }))
    }

    /// Player leave announcement.
    pub fn player_leave(&self, player_id: PlayerId) -> Envelope {
        self.envelope(Payload::PlayerLeave(PlayerLeaveMsg { player_id }))
    }

    /// Ready-state toggle.
    pub fn player_ready(&self, player_id: PlayerId, ready: bool) -> Envelope {
        self.envelope(Payload::PlayerReady(PlayerReadyMsg { player_id, ready }))
    }

    /// Turn advance notice.
    pub fn turn_change(&self, current_turn: usize, player_id: PlayerId) -> Envelope {
        self.envelope(Payload::TurnChange(TurnChangeMsg {
            current_turn,
            player_id,
        }))
    }

    /// Game start notice.
    pub fn game_start(&self, turn_order: Vec<PlayerId>) -> Envelope {
        self.envelope(Payload::GameStart(GameStartMsg { turn_order }))
    }

    /// Game end notice with final scores.
    pub fn game_end(&self, scores: Vec<(PlayerId, i64)>) -> Envelope {
        self.envelope(Payload::GameEnd(GameEndMsg { scores }))
    }

    /// Victory notice.
    pub fn victory(&self, winner: PlayerId, scores: Vec<(PlayerId, i64)>) -> Envelope {
        self.envelope(Payload::Victory(VictoryMsg { winner, scores }))
    }

    /// Pause notice.
    pub fn game_pause(&self) -> Envelope {
        self.envelope(Payload::GamePause(GamePauseMsg {}))
    }

    /// Resume notice.
    pub fn game_resume(&self) -> Envelope {
        self.envelope(Payload::GameResume(GameResumeMsg {}))
    }

    /// Chat line.
    pub fn chat(&self, player_id: PlayerId, text: impl Into<String>) -> Envelope {
        self.envelope(Payload::ChatMessage(ChatMsg {
            player_id,
            text: text.into(),
        }))
    }

    /// Liveness probe.
    pub fn ping(&self, sent_at: Millis) -> Envelope {
        self.envelope(Payload::Ping(PingMsg { sent_at }))
    }

    /// Liveness reply echoing the probe's send time.
    pub fn pong(&self, echo: Millis) -> Envelope {
        self.envelope(Payload::Pong(PongMsg { echo }))
    }

    /// Error report.
    pub fn error(&self, code: impl Into<String>, message: impl Into<String>) -> Envelope {
        self.envelope(Payload::Error(ErrorMsg {
            code: code.into(),
            message: message.into(),
        }))
    }

    /// Ordered bundle of sub-messages.
    pub fn batch(&self, messages: Vec<Envelope>) -> Envelope {
        self.envelope(Payload::Batch(BatchMsg { messages }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn factory() -> MessageFactory {
        MessageFactory::new("test").with_game("g1")
    }

    #[test]
    fn catalog_is_exhaustive_and_round_trips() {
        assert_eq!(MessageType::CATALOG.len(), 22);
        for kind in MessageType::CATALOG {
            assert_eq!(MessageType::from_wire(kind.as_wire()), Some(kind));
        }
        assert_eq!(MessageType::from_wire("teleport"), None);
    }

    #[test]
    fn envelope_wire_shape_has_type_and_data_fields() {
        let env = factory().chat(PlayerId::new("alice"), "hello");
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["data"]["text"], "hello");
        assert_eq!(value["version"], PROTOCOL_VERSION);
        assert_eq!(value["metadata"]["source"], "test");
        assert!(value["id"].as_str().unwrap().starts_with("msg_"));
    }

    #[test]
    fn validate_accepts_well_formed_messages() {
        let env = factory().ping(Millis(5));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(Envelope::validate_value(&value), Ok(()));
    }

    #[test]
    fn validate_rejects_each_missing_required_field() {
        let env = factory().ping(Millis(5));
        let full = serde_json::to_value(&env).unwrap();

        for field in ["id", "type", "timestamp", "version", "data"] {
            let mut value = full.clone();
            value.as_object_mut().unwrap().remove(field);
            let err = Envelope::validate_value(&value).unwrap_err();
            assert!(
                matches!(err, ValidationError::MissingField(f) if f == field),
                "expected missing-field error for {field}, got {err:?}"
            );
        }
    }

    #[test]
    fn validate_rejects_unknown_type() {
        let value = json!({
            "id": "msg_1_1_00000000",
            "type": "warp_drive",
            "timestamp": 1,
            "version": "1.0.0",
            "data": {},
        });
        assert_eq!(
            Envelope::validate_value(&value),
            Err(ValidationError::UnknownType("warp_drive".into()))
        );
    }

    #[test]
    fn validate_rejects_non_positive_timestamp() {
        for bad in [json!(0), json!(-5), json!("late")] {
            let value = json!({
                "id": "msg_1_1_00000000",
                "type": "ping",
                "timestamp": bad,
                "version": "1.0.0",
                "data": { "sent_at": 1 },
            });
            assert_eq!(
                Envelope::validate_value(&value),
                Err(ValidationError::BadTimestamp)
            );
        }
    }

    #[test]
    fn validate_rejects_non_objects() {
        assert_eq!(
            Envelope::validate_value(&json!([1, 2, 3])),
            Err(ValidationError::NotAnObject)
        );
    }

    #[test]
    fn verify_rejects_oversized_chat() {
        let env = factory().chat(PlayerId::new("alice"), "x".repeat(MAX_CHAT_LEN + 1));
        assert_eq!(env.verify(), Err("Chat message too long"));
    }

    #[test]
    fn verify_rejects_oversized_and_nested_batches() {
        let f = factory();
        let many: Vec<Envelope> = (0..MAX_BATCH_LEN + 1).map(|_| f.ping(Millis(1))).collect();
        assert_eq!(f.batch(many).verify(), Err("Too many messages in batch"));

        let nested = f.batch(vec![f.batch(vec![])]);
        assert_eq!(nested.verify(), Err("Nested batch not allowed"));
    }

    #[test]
    fn typed_round_trip_preserves_payload() {
        let env = factory().place_building(
            ActionId(9),
            PlayerId::new("bob"),
            5,
            7,
            BuildingKind::Bridge,
            Millis(42),
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.message_type(), MessageType::PlaceBuilding);
    }

    #[test]
    fn empty_lifecycle_payloads_serialize_as_empty_objects() {
        let value = serde_json::to_value(factory().game_pause()).unwrap();
        assert_eq!(value["data"], json!({}));
    }
}
