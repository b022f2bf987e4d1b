//! The agent manager: consumes the configuration triptych, spawns agent
//! contexts, and owns their lifecycle.

use std::sync::{Arc, Mutex, RwLock};

use tracing::{error, warn};

use botwire_core::config::ENV_AGENT_ID;
use botwire_core::endpoint::ServerEndpoint;
use botwire_core::error::{Error, Result};
use botwire_core::message::Message;

use crate::agent::{AgentFactory, IndexSet};
use crate::context::{AgentContext, ContextDriver, ContextRegistry, ContextShared};
use crate::schema::{
    ConnectionSettings, ControllableTeamInfo, FieldInfo, InitComplete, MatchConfiguration,
    PlayerVariety, SetLoadout,
};
use crate::transport::{Connection, Handler};

/// Connection parameters. Anything unset falls back to the environment.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Falls back to `RLBOT_AGENT_ID`.
    pub agent_id: Option<String>,
    pub wants_ball_predictions: bool,
    pub wants_comms: bool,
}

impl ConnectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            wants_ball_predictions: true,
            wants_comms: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    #[must_use]
    pub fn with_ball_predictions(mut self, wanted: bool) -> Self {
        self.wants_ball_predictions = wanted;
        self
    }

    #[must_use]
    pub fn with_comms(mut self, wanted: bool) -> Self {
        self.wants_comms = wanted;
        self
    }

    fn endpoint(&self) -> ServerEndpoint {
        let mut endpoint = ServerEndpoint::from_env();
        if let Some(host) = &self.host {
            endpoint.host.clone_from(host);
        }
        if let Some(port) = self.port {
            endpoint.port = port;
        }
        endpoint
    }
}

#[derive(Default)]
pub(crate) struct ManagerState {
    pub controllable_team_info: Message,
    pub field_info: Message,
    pub match_configuration: Message,
    /// Live contexts, primary first.
    pub contexts: Vec<AgentContext>,
}

pub(crate) struct ManagerInner {
    factory: Option<Box<dyn AgentFactory>>,
    batch_hivemind: bool,
    conn: RwLock<Option<Arc<Connection>>>,
    pub(crate) state: Mutex<ManagerState>,
    registry: Arc<ContextRegistry>,
}

impl ManagerInner {
    pub(crate) fn connection(&self) -> Option<Arc<Connection>> {
        self.conn.read().expect("connection lock").clone()
    }

    /// Spawn agents once all three control-plane messages are cached.
    ///
    /// Runs on the service thread. A re-arriving triptych message lands
    /// here again: the previous contexts are terminated and joined before
    /// the new configuration is consumed.
    pub(crate) fn try_spawn(&self) {
        let Some(factory) = &self.factory else {
            return;
        };
        let Some(conn) = self.connection() else {
            return;
        };

        let (team_info_msg, field_info_msg, match_config_msg) = {
            let state = self.state.lock().expect("manager mutex");
            if !state.controllable_team_info.is_valid()
                || !state.field_info.is_valid()
                || !state.match_configuration.is_valid()
            {
                return;
            }
            (
                state.controllable_team_info.clone(),
                state.field_info.clone(),
                state.match_configuration.clone(),
            )
        };

        // already validated at the router; a decode failure here means the
        // cached message went stale, so just bail
        let Ok(team_info) = team_info_msg.payload::<ControllableTeamInfo>() else {
            return;
        };
        let Ok(field_info) = field_info_msg.payload::<FieldInfo>() else {
            return;
        };
        let Ok(match_config) = match_config_msg.payload::<MatchConfiguration>() else {
            return;
        };

        self.clear_agents();

        let field_info = Arc::new(field_info);
        let match_config = Arc::new(match_config);
        let team = team_info.team;

        let mut seen = IndexSet::new();
        let mut roster: Vec<(IndexSet, String)> = Vec::new();
        let mut hive_name = String::new();

        for controllable in &team_info.controllables {
            let Some(player) = match_config
                .players
                .iter()
                .find(|p| p.player_id == controllable.identifier)
            else {
                warn!(
                    identifier = controllable.identifier,
                    "controllable not found in match configuration"
                );
                continue;
            };
            if player.team != team {
                warn!(index = controllable.index, "controllable team mismatch");
                continue;
            }
            if !seen.insert(controllable.index) {
                warn!(index = controllable.index, "duplicate controllable index");
                continue;
            }
            if player.variety != PlayerVariety::CustomBot {
                warn!(index = controllable.index, "controllable is not a custom bot");
                continue;
            }

            if self.batch_hivemind {
                if hive_name.is_empty() {
                    hive_name.clone_from(&player.name);
                }
                // defer creation: all indices collapse into one context
            } else {
                let indices: IndexSet = std::iter::once(controllable.index).collect();
                roster.push((indices, player.name.clone()));
            }
        }

        if self.batch_hivemind && !seen.is_empty() {
            roster.push((seen.clone(), hive_name));
        }

        let mut contexts = Vec::with_capacity(roster.len());
        for (indices, name) in roster {
            let mut agent = factory.spawn(indices.clone(), team, name);

            let mut ordered: Vec<u32> = indices.iter().copied().collect();
            ordered.sort_unstable();
            for index in ordered {
                if let Some(loadout) = agent.loadout(index) {
                    conn.send(&SetLoadout { index, loadout });
                }
            }

            let shared = ContextShared::new(indices, team);
            let driver = ContextDriver::new(
                Arc::clone(&shared),
                Arc::clone(&self.registry),
                Arc::clone(&conn),
                agent,
                Arc::clone(&field_info),
                Arc::clone(&match_config),
            );
            contexts.push(AgentContext::new(shared, driver));
        }

        self.registry
            .replace(contexts.iter().map(|c| Arc::clone(&c.shared)).collect());

        // the primary context is handled on the reader thread; the rest get
        // their own service threads
        for context in contexts.iter_mut().skip(1) {
            context.start_service();
        }
        if let Some(primary) = contexts.first() {
            primary.shared.ready.signal();
        }

        let ready: Vec<_> = contexts.iter().map(|c| Arc::clone(&c.shared)).collect();
        self.state.lock().expect("manager mutex").contexts = contexts;

        for shared in ready {
            shared.ready.wait();
        }
        conn.send(&InitComplete {});
    }

    /// Terminate and join every context. The primary context has no thread;
    /// dropping it releases its agent.
    pub(crate) fn clear_agents(&self) {
        let mut contexts = {
            let mut state = self.state.lock().expect("manager mutex");
            std::mem::take(&mut state.contexts)
        };
        if contexts.is_empty() {
            return;
        }

        self.registry.replace(Vec::new());
        for context in &contexts {
            context.terminate();
        }
        for context in &mut contexts {
            context.join();
        }
    }
}

impl Handler for ManagerInner {
    fn attached(&self, connection: &Arc<Connection>) {
        *self.conn.write().expect("connection lock") = Some(Arc::clone(connection));
    }

    fn on_message(&self, message: Message) {
        self.route(message);
    }

    fn on_agent_wake(&self) {
        self.primary_loop_once();
    }
}

/// Owns the connection and the agent contexts of one client process.
pub struct AgentManager {
    inner: Arc<ManagerInner>,
}

impl AgentManager {
    /// A manager that spawns one context per controllable, or one hivemind
    /// context for the whole team when `batch_hivemind` is set.
    #[must_use]
    pub fn new(batch_hivemind: bool, factory: impl AgentFactory + 'static) -> Self {
        Self::build(batch_hivemind, Some(Box::new(factory)))
    }

    /// A manager with a null factory: connect, send commands, wait for the
    /// writer, disconnect. Used by match launchers.
    #[must_use]
    pub fn launcher() -> Self {
        Self::build(false, None)
    }

    fn build(batch_hivemind: bool, factory: Option<Box<dyn AgentFactory>>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                factory,
                batch_hivemind,
                conn: RwLock::new(None),
                state: Mutex::new(ManagerState::default()),
                registry: Arc::new(ContextRegistry::default()),
            }),
        }
    }

    /// Connect to the match server and declare this client.
    ///
    /// The agent id comes from the options or `RLBOT_AGENT_ID`; a manager
    /// with a factory refuses to connect without one.
    pub fn connect(&self, options: ConnectOptions) -> Result<()> {
        if self
            .connection()
            .is_some_and(|conn| conn.is_running())
        {
            error!("already connected");
            return Err(Error::protocol("already connected"));
        }

        let agent_id = options.agent_id.clone().or_else(|| {
            std::env::var(ENV_AGENT_ID)
                .ok()
                .filter(|id| !id.is_empty())
        });
        if agent_id.is_none() && self.inner.factory.is_some() {
            error!("no agent id provided");
            return Err(Error::protocol("no agent id provided"));
        }

        let handler: Arc<dyn Handler> = Arc::clone(&self.inner) as Arc<dyn Handler>;
        let conn = Connection::connect(&options.endpoint(), handler)?;

        if let Some(agent_id) = agent_id {
            conn.send(&ConnectionSettings {
                agent_id,
                wants_ball_predictions: options.wants_ball_predictions,
                wants_comms: options.wants_comms,
                close_between_matches: true,
            });
        }

        Ok(())
    }

    /// The live connection, once `connect` has succeeded.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.inner.connection()
    }

    /// Block until all queued output has reached the socket.
    pub fn wait_for_writer_idle(&self) {
        if let Some(conn) = self.connection() {
            conn.wait_for_writer_idle();
        }
    }

    /// Request teardown of the service thread and all contexts.
    pub fn terminate(&self) {
        if let Some(conn) = self.connection() {
            conn.terminate();
        }
    }

    /// Join the service thread, then tear down every context and release
    /// the cached control-plane messages.
    pub fn join(&self) {
        if let Some(conn) = self.connection() {
            conn.join();
        }
        self.inner.clear_agents();

        let mut state = self.inner.state.lock().expect("manager mutex");
        state.controllable_team_info.reset();
        state.field_info.reset();
        state.match_configuration.reset();
    }
}

impl Drop for AgentManager {
    fn drop(&mut self) {
        self.terminate();
        self.join();
    }
}
