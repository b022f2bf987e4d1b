//! Match launcher: connect with a null factory, push a match
//! configuration, wait for the writer to drain, and leave.

use botwire::schema::{MatchConfiguration, PlayerConfiguration, PlayerVariety};
use botwire::{AgentManager, ConnectOptions};

fn main() -> botwire::Result<()> {
    botwire::logging::init();

    let manager = AgentManager::launcher();
    manager.connect(ConnectOptions::new())?;

    let conn = manager.connection().expect("connected");
    conn.send(&MatchConfiguration {
        players: vec![
            PlayerConfiguration {
                player_id: 1,
                team: 0,
                name: "chaser-blue".to_owned(),
                variety: PlayerVariety::CustomBot,
            },
            PlayerConfiguration {
                player_id: 2,
                team: 1,
                name: "chaser-orange".to_owned(),
                variety: PlayerVariety::CustomBot,
            },
        ],
        enable_rendering: false,
        enable_state_setting: false,
    });

    manager.wait_for_writer_idle();
    manager.terminate();
    manager.join();
    Ok(())
}
