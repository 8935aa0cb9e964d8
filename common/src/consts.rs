/// Default capacity of the channel between a subscription pump and its cursor.
pub const DEFAULT_BATCH_BUFFER: usize = 1_000;

/// How often a network source sends a heartbeat to an idle subscriber.
pub const DEFAULT_HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15);

/// Frames a source queues for one subscriber before dropping it as too slow.
pub const DEFAULT_SUBSCRIBER_BACKLOG: usize = 10_000;

/// Longest frame line a network transport accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Longest request or handshake line.
pub const MAX_CONTROL_LINE_LEN: usize = 64 * 1024;

/// How long a network transport waits for a connection and its handshake.
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
