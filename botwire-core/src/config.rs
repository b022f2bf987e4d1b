//! Shared constants and environment variable names.

/// Capacity of one pooled I/O buffer.
///
/// Large enough to hold a full-size tick packet and a prediction frame
/// back-to-back, so a frame never exceeds one buffer.
pub const BUFFER_CAPACITY: usize = 2 * 65536;

/// Socket send/receive buffer size: room for at least four maximum frames.
pub const SOCKET_BUFFER_SIZE: usize = 4 * 65536;

/// Number of buffers preallocated (and marked preferred) at transport init.
///
/// Also bounds how many frames a single vectored write submission carries.
pub const PREALLOCATED_BUFFERS: usize = 32;

/// Number of buffer pool shards used to spread acquire contention.
pub const POOL_SHARDS: usize = 4;

/// Largest payload a frame can carry; the length field is an unsigned 16-bit.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Environment variable naming this agent instance to the server.
pub const ENV_AGENT_ID: &str = "RLBOT_AGENT_ID";

/// Environment variables overriding the default server endpoint.
pub const ENV_SERVER_IP: &str = "RLBOT_SERVER_IP";
pub const ENV_SERVER_PORT: &str = "RLBOT_SERVER_PORT";

/// Environment variable selecting the log level ladder.
pub const ENV_LOG_LEVEL: &str = "RLBOT_LOG_LEVEL";

/// Default server endpoint.
pub const DEFAULT_SERVER_IP: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 23234;
