//! Fake match server for integration tests.
//!
//! Binds a real TCP listener on an OS-assigned port and speaks the tagged
//! frame dialect over std blocking sockets, so the client's completion-based
//! path is exercised end-to-end.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use botwire::schema::{
    ControllableInfo, ControllableTeamInfo, FieldInfo, MatchConfiguration, PlayerConfiguration,
    PlayerVariety,
};
use botwire::{ConnectOptions, Kind};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestServer {
    listener: TcpListener,
    pub port: u16,
}

impl TestServer {
    pub fn bind() -> Self {
        botwire::logging::init();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let port = listener.local_addr().expect("local addr").port();
        Self { listener, port }
    }

    pub fn options(&self) -> ConnectOptions {
        ConnectOptions::new()
            .with_host("127.0.0.1")
            .with_port(self.port)
    }

    pub fn accept(&self) -> ServerPeer {
        let (stream, _) = self.listener.accept().expect("accept client");
        stream.set_nodelay(true).expect("nodelay");
        stream
            .set_read_timeout(Some(RECV_TIMEOUT))
            .expect("read timeout");
        ServerPeer { stream }
    }
}

pub struct ServerPeer {
    stream: TcpStream,
}

impl ServerPeer {
    pub fn send_raw(&mut self, kind: Kind, payload: &[u8]) {
        assert!(payload.len() <= usize::from(u16::MAX));
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&kind.to_wire().to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(payload);
        self.stream.write_all(&frame).expect("server write");
    }

    pub fn send<T: Serialize>(&mut self, kind: Kind, payload: &T) {
        let bytes = rmp_serde::to_vec(payload).expect("encode payload");
        self.send_raw(kind, &bytes);
    }

    pub fn recv_frame(&mut self) -> (Kind, Vec<u8>) {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).expect("frame header");
        let kind = Kind::from_wire(u16::from_be_bytes([header[0], header[1]]));
        let len = usize::from(u16::from_be_bytes([header[2], header[3]]));
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).expect("frame payload");
        (kind, payload)
    }

    /// Receive the next frame and decode it, asserting its kind.
    pub fn recv_payload<T: DeserializeOwned>(&mut self, expected: Kind) -> T {
        let (kind, payload) = self.recv_frame();
        assert_eq!(kind, expected, "unexpected frame kind");
        rmp_serde::from_slice(&payload).expect("decode payload")
    }

    /// Skip frames until one of `expected` arrives, decoding it.
    pub fn recv_until<T: DeserializeOwned>(&mut self, expected: Kind) -> T {
        loop {
            let (kind, payload) = self.recv_frame();
            if kind == expected {
                return rmp_serde::from_slice(&payload).expect("decode payload");
            }
        }
    }

    /// Assert the client closed its end of the connection.
    pub fn expect_eof(&mut self) {
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Ok(0) | Err(_) => {}
            Ok(_) => panic!("expected EOF, got data"),
        }
    }

    /// Send the control-plane triptych that spawns agents.
    ///
    /// `controllables` is `(index, identifier)`; `players` is
    /// `(player_id, team, name)`.
    pub fn send_triptych(
        &mut self,
        team: u32,
        controllables: &[(u32, i32)],
        players: &[(i32, u32, &str)],
        enable_rendering: bool,
        enable_state_setting: bool,
    ) {
        let team_info = ControllableTeamInfo {
            team,
            controllables: controllables
                .iter()
                .map(|&(index, identifier)| ControllableInfo { index, identifier })
                .collect(),
        };
        let match_config = MatchConfiguration {
            players: players
                .iter()
                .map(|&(player_id, team, name)| PlayerConfiguration {
                    player_id,
                    team,
                    name: name.to_owned(),
                    variety: PlayerVariety::CustomBot,
                })
                .collect(),
            enable_rendering,
            enable_state_setting,
        };

        self.send(Kind::ControllableTeamInfo, &team_info);
        self.send(Kind::FieldInfo, &FieldInfo::default());
        self.send(Kind::MatchConfiguration, &match_config);
    }
}
