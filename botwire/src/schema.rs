//! Payload types for the routed message kinds.
//!
//! The frame header carries the kind and length; payload interiors are
//! schema-encoded (MessagePack via serde). Only the fields the runtime
//! routes on are modelled here — the rest of each payload is owned by the
//! application layer and travels through untouched.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use botwire_core::message::Kind;

/// Binds an outbound payload type to its wire kind.
pub trait OutboundPayload: Serialize {
    const KIND: Kind;
}

macro_rules! outbound {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(impl OutboundPayload for $ty {
            const KIND: Kind = Kind::$kind;
        })*
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// First frame out: declares this process to the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub agent_id: String,
    pub wants_ball_predictions: bool,
    pub wants_comms: bool,
    pub close_between_matches: bool,
}

/// One participant this process is allowed to control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllableInfo {
    pub index: u32,
    /// Identifier matched against `PlayerConfiguration::player_id`.
    pub identifier: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllableTeamInfo {
    pub team: u32,
    pub controllables: Vec<ControllableInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoostPad {
    pub location: Vec3,
    pub is_full_boost: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalInfo {
    pub team_num: u32,
    pub location: Vec3,
}

/// Static world layout, sent once per match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub boost_pads: Vec<BoostPad>,
    pub goals: Vec<GoalInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerVariety {
    CustomBot,
    Psyonix,
    Human,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfiguration {
    pub player_id: i32,
    pub team: u32,
    pub name: String,
    pub variety: PlayerVariety,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchConfiguration {
    pub players: Vec<PlayerConfiguration>,
    pub enable_rendering: bool,
    pub enable_state_setting: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub team: u32,
    pub location: Vec3,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BallInfo {
    pub location: Vec3,
    pub velocity: Vec3,
}

/// Dense per-tick state. Triggers one agent update per context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GamePacket {
    pub frame_num: u64,
    pub players: Vec<PlayerInfo>,
    pub ball: BallInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSlice {
    pub game_seconds: f32,
    pub location: Vec3,
}

/// Predicted trajectory, paired with the next game packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BallPrediction {
    pub slices: Vec<PredictionSlice>,
}

/// Inter-agent message. `team_only` restricts delivery to the sender's team.
///
/// The content is refcounted so local loopback delivers it to sibling
/// contexts without copying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchComm {
    pub index: u32,
    pub team: u32,
    pub team_only: bool,
    pub display: Option<String>,
    pub content: Bytes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub throttle: f32,
    pub steer: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub jump: bool,
    pub boost: bool,
    pub handbrake: bool,
}

/// Controller state for one owned participant, once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerInput {
    pub player_index: u32,
    pub controller_state: ControllerState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredGameState {
    pub console_commands: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderMessage {
    pub text: String,
    pub location: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderGroup {
    pub id: i32,
    pub render_messages: Vec<RenderMessage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRenderGroup {
    pub id: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLoadout {
    pub team_color_id: u32,
    pub custom_color_id: u32,
    pub car_id: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLoadout {
    pub index: u32,
    pub loadout: PlayerLoadout,
}

/// Sent once all contexts report ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitComplete {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCommand {
    pub config_path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopCommand {
    pub shutdown_server: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingStatus {
    pub index: u32,
    pub is_rendering: bool,
}

outbound! {
    ConnectionSettings => ConnectionSettings,
    ControllableTeamInfo => ControllableTeamInfo,
    FieldInfo => FieldInfo,
    MatchConfiguration => MatchConfiguration,
    GamePacket => GamePacket,
    BallPrediction => BallPrediction,
    MatchComm => MatchComm,
    PlayerInput => PlayerInput,
    DesiredGameState => DesiredGameState,
    RenderGroup => RenderGroup,
    RemoveRenderGroup => RemoveRenderGroup,
    SetLoadout => SetLoadout,
    InitComplete => InitComplete,
    StartCommand => StartCommand,
    StopCommand => StopCommand,
    RenderingStatus => RenderingStatus,
}
