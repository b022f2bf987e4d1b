//! The agent callback surface and its outbox helper.

use std::sync::Mutex;

use bytes::Bytes;
use hashbrown::HashMap;

use crate::schema::{
    BallPrediction, ControllerState, DesiredGameState, FieldInfo, GamePacket, MatchComm,
    MatchConfiguration, PlayerLoadout, RenderMessage,
};

/// Participant indices owned by one context. A hivemind owns several.
pub type IndexSet = hashbrown::HashSet<u32>;

/// User-supplied decision logic for one or more participants.
///
/// All callbacks run on the owning context's thread (the I/O thread for the
/// primary context) with no library lock held. References passed to
/// [`Agent::update`] are only valid for the duration of the call.
pub trait Agent: Send {
    /// One call per tick per context, after any queued match comms.
    fn update(
        &mut self,
        packet: &GamePacket,
        prediction: Option<&BallPrediction>,
        field: &FieldInfo,
        config: &MatchConfiguration,
    );

    /// One call per owned index per tick, after `update`.
    fn output(&mut self, index: u32) -> ControllerState;

    /// Called per inbound comm, before the tick's `update`.
    fn match_comm(&mut self, comm: &MatchComm) {
        let _ = comm;
    }

    /// Polled once per owned index at spawn; `Some` becomes a SetLoadout.
    fn loadout(&mut self, index: u32) -> Option<PlayerLoadout> {
        let _ = index;
        None
    }

    /// Drained after each tick; `None` means nothing to send.
    fn take_match_comms(&mut self) -> Option<Vec<MatchComm>> {
        None
    }

    /// Drained after each tick. Discarded when state setting is disabled.
    fn take_desired_game_state(&mut self) -> Option<DesiredGameState> {
        None
    }

    /// Drained after each tick, keyed by render group id. An empty group
    /// clears that group. Discarded when rendering is disabled.
    fn take_render_messages(&mut self) -> Option<HashMap<i32, Vec<RenderMessage>>> {
        None
    }
}

/// Constructs agents during spawn: `(indices, team, name) -> agent`.
pub trait AgentFactory: Send + Sync {
    fn spawn(&self, indices: IndexSet, team: u32, name: String) -> Box<dyn Agent>;
}

impl<F> AgentFactory for F
where
    F: Fn(IndexSet, u32, String) -> Box<dyn Agent> + Send + Sync,
{
    fn spawn(&self, indices: IndexSet, team: u32, name: String) -> Box<dyn Agent> {
        self(indices, team, name)
    }
}

#[derive(Default)]
struct OutboxInner {
    match_comms: Option<Vec<MatchComm>>,
    game_state: Option<DesiredGameState>,
    render_messages: Option<HashMap<i32, Vec<RenderMessage>>>,
}

/// Convenience storage for queued agent outputs.
///
/// Embed one in an agent, queue from anywhere (including other threads the
/// agent spawns), and delegate the trait's `take_*` methods to it; the
/// context drains it after every tick.
pub struct AgentOutbox {
    team: u32,
    inner: Mutex<OutboxInner>,
}

impl AgentOutbox {
    #[must_use]
    pub fn new(team: u32) -> Self {
        Self {
            team,
            inner: Mutex::new(OutboxInner::default()),
        }
    }

    /// Queue an inter-agent message from the participant at `index`.
    pub fn send_match_comm(
        &self,
        index: u32,
        display: Option<String>,
        content: impl Into<Bytes>,
        team_only: bool,
    ) {
        let comm = MatchComm {
            index,
            team: self.team,
            team_only,
            display,
            content: content.into(),
        };
        self.inner
            .lock()
            .expect("outbox mutex")
            .match_comms
            .get_or_insert_with(Vec::new)
            .push(comm);
    }

    /// Queue a state-setting request. Replaces any not-yet-drained one.
    pub fn send_desired_game_state(&self, state: DesiredGameState) {
        self.inner.lock().expect("outbox mutex").game_state = Some(state);
    }

    /// Queue a render message into `group`.
    pub fn send_render_message(&self, group: i32, message: RenderMessage) {
        self.inner
            .lock()
            .expect("outbox mutex")
            .render_messages
            .get_or_insert_with(HashMap::new)
            .entry(group)
            .or_default()
            .push(message);
    }

    /// Queue removal of a render group.
    pub fn clear_render_group(&self, group: i32) {
        self.inner
            .lock()
            .expect("outbox mutex")
            .render_messages
            .get_or_insert_with(HashMap::new)
            .insert(group, Vec::new());
    }

    pub fn take_match_comms(&self) -> Option<Vec<MatchComm>> {
        self.inner.lock().expect("outbox mutex").match_comms.take()
    }

    pub fn take_desired_game_state(&self) -> Option<DesiredGameState> {
        self.inner.lock().expect("outbox mutex").game_state.take()
    }

    pub fn take_render_messages(&self) -> Option<HashMap<i32, Vec<RenderMessage>>> {
        self.inner
            .lock()
            .expect("outbox mutex")
            .render_messages
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_queues_and_drains() {
        let outbox = AgentOutbox::new(1);
        outbox.send_match_comm(0, Some("hi".into()), vec![], false);
        outbox.send_match_comm(0, None, vec![9], true);

        let comms = outbox.take_match_comms().unwrap();
        assert_eq!(comms.len(), 2);
        assert_eq!(comms[0].team, 1);
        assert!(comms[1].team_only);
        assert!(outbox.take_match_comms().is_none(), "drained");
    }

    #[test]
    fn empty_render_group_marks_removal() {
        let outbox = AgentOutbox::new(0);
        outbox.send_render_message(4, RenderMessage::default());
        outbox.clear_render_group(4);

        let groups = outbox.take_render_messages().unwrap();
        assert!(groups[&4].is_empty());
    }

    #[test]
    fn desired_state_keeps_latest() {
        let outbox = AgentOutbox::new(0);
        outbox.send_desired_game_state(DesiredGameState {
            console_commands: vec!["first".into()],
        });
        outbox.send_desired_game_state(DesiredGameState {
            console_commands: vec!["second".into()],
        });

        let state = outbox.take_desired_game_state().unwrap();
        assert_eq!(state.console_commands, ["second"]);
    }
}
