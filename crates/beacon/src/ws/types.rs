//! WebSocket control frames.
//!
//! Delivered messages are serialized `Message` objects (the wire shape);
//! these frames carry everything else on the socket.

use serde::{Deserialize, Serialize};

/// Control messages accepted from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Start or continue a run.
    Query { query: String },
    /// Keepalive probe; answered with a pong, never touches status or
    /// message ordering.
    Ping,
    /// Reply to a server-initiated ping.
    Pong,
}

/// Control frames sent to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Connection established; carries the session assigned to this socket.
    Connected { session_id: String },
    /// Server-initiated keepalive.
    Ping,
    /// Reply to a client ping.
    Pong,
    /// Transport-level error report.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_command_parses() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"query","query":"What is 2+2?"}"#).unwrap();
        match cmd {
            ClientCommand::Query { query } => assert_eq!(query, "What is 2+2?"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ping_round_trip_shape() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(cmd, ClientCommand::Ping));
        let frame = serde_json::to_string(&ServerFrame::Pong).unwrap();
        assert_eq!(frame, r#"{"type":"pong"}"#);
    }
}
