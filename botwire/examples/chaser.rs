//! A minimal ball-chasing agent: full throttle, steer toward the ball.
//!
//! Run with a match server listening on the default endpoint:
//!
//! ```text
//! RLBOT_AGENT_ID=botwire/chaser cargo run --example chaser
//! ```

use botwire::schema::{
    BallPrediction, ControllerState, FieldInfo, GamePacket, MatchConfiguration,
};
use botwire::{Agent, AgentManager, ConnectOptions, IndexSet};

struct Chaser {
    indices: IndexSet,
    outputs: hashbrown::HashMap<u32, ControllerState>,
}

impl Chaser {
    fn new(indices: IndexSet, team: u32, name: String) -> Self {
        for index in &indices {
            println!("Team {team} Index {index}: {name} created");
        }
        Self {
            indices,
            outputs: hashbrown::HashMap::new(),
        }
    }
}

impl Agent for Chaser {
    fn update(
        &mut self,
        packet: &GamePacket,
        _prediction: Option<&BallPrediction>,
        _field: &FieldInfo,
        _config: &MatchConfiguration,
    ) {
        for &index in &self.indices {
            let controller = self.outputs.entry(index).or_default();
            *controller = ControllerState::default();

            // We're not in the game packet; skip this tick
            let Some(car) = packet.players.get(index as usize) else {
                continue;
            };

            let to_ball = (
                packet.ball.location.x - car.location.x,
                packet.ball.location.y - car.location.y,
            );
            let angle = to_ball.1.atan2(to_ball.0);

            controller.throttle = 1.0;
            controller.steer = angle.signum();
        }
    }

    fn output(&mut self, index: u32) -> ControllerState {
        self.outputs.get(&index).copied().unwrap_or_default()
    }
}

fn main() -> botwire::Result<()> {
    botwire::logging::init();

    let manager = AgentManager::new(true, |indices: IndexSet, team, name: String| {
        Box::new(Chaser::new(indices, team, name)) as Box<dyn Agent>
    });

    manager.connect(ConnectOptions::new())?;
    manager.join();
    Ok(())
}
