//! Inbound message routing.
//!
//! Applied in order on every frame the reader emits: control-plane messages
//! (the configuration triptych) drive agent spawning; state-plane messages
//! are fanned out to the live contexts. The primary context never gets a
//! wakeup — its loop iteration runs inline on the I/O thread, right here.

use tracing::{debug, info, trace, warn};

use botwire_core::message::{Kind, Message};

use crate::context::AgentContext;
use crate::manager::ManagerInner;
use crate::schema::{
    BallPrediction, ControllableTeamInfo, FieldInfo, GamePacket, MatchComm, MatchConfiguration,
};

impl ManagerInner {
    /// The routing table. Runs on the service thread only.
    pub(crate) fn route(&self, message: Message) {
        match message.kind() {
            Kind::None => {
                info!("received disconnect");
                if let Some(conn) = self.connection() {
                    conn.terminate();
                }
            }

            Kind::ControllableTeamInfo => {
                if let Err(err) = message.payload::<ControllableTeamInfo>() {
                    warn!(%err, "dropping ControllableTeamInfo");
                    return;
                }
                info!("received ControllableTeamInfo");
                self.state.lock().expect("manager mutex").controllable_team_info = message;
                self.try_spawn();
            }

            Kind::FieldInfo => {
                if let Err(err) = message.payload::<FieldInfo>() {
                    warn!(%err, "dropping FieldInfo");
                    return;
                }
                info!("received FieldInfo");
                self.state.lock().expect("manager mutex").field_info = message;
                self.try_spawn();
            }

            Kind::MatchConfiguration => {
                if let Err(err) = message.payload::<MatchConfiguration>() {
                    warn!(%err, "dropping MatchConfiguration");
                    return;
                }
                info!("received MatchConfiguration");
                self.state.lock().expect("manager mutex").match_configuration = message;
                self.try_spawn();
            }

            Kind::RenderingStatus => debug!("received RenderingStatus"),

            kind => self.route_state_plane(kind, message),
        }
    }

    /// State-plane fan-out. Everything here is dropped while no contexts
    /// exist.
    fn route_state_plane(&self, kind: Kind, message: Message) {
        match kind {
            Kind::BallPrediction => {
                if let Err(err) = message.payload::<BallPrediction>() {
                    warn!(%err, "dropping BallPrediction");
                    return;
                }
                let state = self.state.lock().expect("manager mutex");
                // latest-wins snapshot; paired with the next packet, so no
                // wakeup of its own
                for context in &state.contexts {
                    context.shared.set_ball_prediction(message.clone());
                }
            }

            Kind::GamePacket => {
                if let Err(err) = message.payload::<GamePacket>() {
                    warn!(%err, "dropping GamePacket");
                    return;
                }
                {
                    let state = self.state.lock().expect("manager mutex");
                    if state.contexts.is_empty() {
                        return;
                    }
                    for context in state.contexts.iter().skip(1) {
                        context.shared.set_game_packet(message.clone(), true);
                    }
                    let primary: &AgentContext = &state.contexts[0];
                    primary.shared.set_game_packet(message, false);
                }
                // handle the primary context on the reader thread
                self.primary_loop_once();
            }

            Kind::MatchComm => {
                let comm: MatchComm = match message.payload() {
                    Ok(comm) => comm,
                    Err(err) => {
                        warn!(%err, "dropping MatchComm");
                        return;
                    }
                };
                {
                    let state = self.state.lock().expect("manager mutex");
                    if state.contexts.is_empty() {
                        return;
                    }
                    for context in state.contexts.iter().skip(1) {
                        context.shared.add_match_comm(message.clone(), &comm, true);
                    }
                    state.contexts[0]
                        .shared
                        .add_match_comm(message, &comm, false);
                }
                self.primary_loop_once();
            }

            _ => trace!(?kind, "unrouted message"),
        }
    }

    /// Run one loop iteration of the primary context, with no manager lock
    /// held across the agent callbacks.
    pub(crate) fn primary_loop_once(&self) {
        let driver = {
            let mut state = self.state.lock().expect("manager mutex");
            state
                .contexts
                .first_mut()
                .and_then(AgentContext::take_driver)
        };
        let Some(mut driver) = driver else {
            return;
        };

        driver.loop_once();

        let mut state = self.state.lock().expect("manager mutex");
        if let Some(first) = state.contexts.first_mut() {
            first.put_driver(driver);
        }
    }
}
