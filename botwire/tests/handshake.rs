//! Control-plane handshake: ConnectionSettings out, triptych in, one
//! context spawned, loadout and InitComplete out.

mod common;

use std::sync::{Arc, Mutex};

use botwire::schema::{
    BallPrediction, ConnectionSettings, ControllerState, FieldInfo, GamePacket, InitComplete,
    MatchConfiguration, PlayerLoadout, SetLoadout,
};
use botwire::{Agent, AgentManager, IndexSet, Kind};

use common::TestServer;

struct LoadoutAgent;

impl Agent for LoadoutAgent {
    fn update(
        &mut self,
        _packet: &GamePacket,
        _prediction: Option<&BallPrediction>,
        _field: &FieldInfo,
        _config: &MatchConfiguration,
    ) {
    }

    fn output(&mut self, _index: u32) -> ControllerState {
        ControllerState::default()
    }

    fn loadout(&mut self, _index: u32) -> Option<PlayerLoadout> {
        Some(PlayerLoadout {
            team_color_id: 3,
            custom_color_id: 0,
            car_id: 23,
        })
    }
}

#[test]
fn handshake_spawns_one_context() {
    let server = TestServer::bind();

    let spawns: Arc<Mutex<Vec<(Vec<u32>, u32, String)>>> = Arc::default();
    let manager = {
        let spawns = Arc::clone(&spawns);
        AgentManager::new(false, move |indices: IndexSet, team, name: String| {
            let mut sorted: Vec<u32> = indices.iter().copied().collect();
            sorted.sort_unstable();
            spawns.lock().unwrap().push((sorted, team, name));
            Box::new(LoadoutAgent) as Box<dyn Agent>
        })
    };

    manager
        .connect(server.options().with_agent_id("X"))
        .expect("connect");
    let mut peer = server.accept();

    let settings: ConnectionSettings = peer.recv_payload(Kind::ConnectionSettings);
    assert_eq!(settings.agent_id, "X");
    assert!(settings.wants_ball_predictions);
    assert!(settings.wants_comms);
    assert!(settings.close_between_matches);

    peer.send_triptych(0, &[(0, 7)], &[(7, 0, "X")], false, false);

    let loadout: SetLoadout = peer.recv_payload(Kind::SetLoadout);
    assert_eq!(loadout.index, 0);
    assert_eq!(loadout.loadout.car_id, 23);

    let _init: InitComplete = peer.recv_payload(Kind::InitComplete);

    assert_eq!(
        spawns.lock().unwrap().as_slice(),
        &[(vec![0], 0, "X".to_owned())]
    );

    manager.terminate();
    manager.join();
}

#[test]
fn spawn_skips_mismatched_controllables() {
    let server = TestServer::bind();

    let spawns: Arc<Mutex<Vec<Vec<u32>>>> = Arc::default();
    let manager = {
        let spawns = Arc::clone(&spawns);
        AgentManager::new(false, move |indices: IndexSet, _team, _name: String| {
            let mut sorted: Vec<u32> = indices.iter().copied().collect();
            sorted.sort_unstable();
            spawns.lock().unwrap().push(sorted);
            Box::new(LoadoutAgent) as Box<dyn Agent>
        })
    };

    manager
        .connect(server.options().with_agent_id("strict"))
        .expect("connect");
    let mut peer = server.accept();
    let _: ConnectionSettings = peer.recv_payload(Kind::ConnectionSettings);

    // index 1 points at a missing player id, index 2 at the wrong team,
    // index 0 twice; only the first index 0 survives
    peer.send_triptych(
        0,
        &[(0, 7), (1, 99), (2, 8), (0, 7)],
        &[(7, 0, "ok"), (8, 1, "other-team")],
        false,
        false,
    );

    // a SetLoadout for index 0 and then InitComplete, nothing else
    let loadout: SetLoadout = peer.recv_payload(Kind::SetLoadout);
    assert_eq!(loadout.index, 0);
    let _: InitComplete = peer.recv_payload(Kind::InitComplete);

    assert_eq!(spawns.lock().unwrap().as_slice(), &[vec![0]]);

    manager.terminate();
    manager.join();
}

#[test]
fn connect_without_agent_id_fails() {
    let server = TestServer::bind();
    let manager = AgentManager::new(false, |_indices: IndexSet, _team, _name: String| {
        Box::new(LoadoutAgent) as Box<dyn Agent>
    });

    // No option and no env var: the manager refuses before touching the
    // socket.
    std::env::remove_var("RLBOT_AGENT_ID");
    assert!(manager.connect(server.options()).is_err());
}
