use serde::{Deserialize, Serialize};

use super::types::{ConnectionId, UserInfo};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Register on the roster (or rename)
    #[serde(rename = "join")]
    Join { display_name: String },

    /// Ring another user
    #[serde(rename = "call_user")]
    CallUser { target_id: ConnectionId },

    /// Accept or decline the offer placed by `target_id`
    #[serde(rename = "answer_call")]
    AnswerCall { accept: bool, target_id: ConnectionId },

    /// Leave the current call and cancel outstanding rings
    #[serde(rename = "hang_up")]
    HangUp,

    /// Relay an opaque session-negotiation payload to the call partner
    #[serde(rename = "send_signal")]
    SendSignal {
        signal: String,
        target_id: ConnectionId,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent once per connection, before anything else
    #[serde(rename = "welcome")]
    Welcome { your_id: ConnectionId },

    /// Full roster, in join order
    #[serde(rename = "update_user_list")]
    UpdateUserList { users: Vec<UserInfo> },

    #[serde(rename = "incoming_call")]
    IncomingCall { user: UserInfo },

    #[serde(rename = "call_accepted")]
    CallAccepted { user: UserInfo },

    #[serde(rename = "call_declined")]
    CallDeclined { user: UserInfo, reason: String },

    #[serde(rename = "call_ended")]
    CallEnded { user: UserInfo, reason: String },

    /// Opaque payload from the call partner, forwarded untouched
    #[serde(rename = "receive_signal")]
    ReceiveSignal { user: UserInfo, signal: String },

    /// Error response
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserInfo {
        UserInfo {
            connection_id: ConnectionId::from("conn_aaaa0001"),
            display_name: "alice".to_string(),
            in_call: false,
        }
    }

    #[test]
    fn parse_join() {
        let json = r#"{"type": "join", "display_name": "alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                display_name: "alice".to_string()
            }
        );
    }

    #[test]
    fn parse_call_user() {
        let json = r#"{"type": "call_user", "target_id": "conn_bbbb0002"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        if let ClientMessage::CallUser { target_id } = msg {
            assert_eq!(target_id.as_str(), "conn_bbbb0002");
        } else {
            panic!("Expected CallUser");
        }
    }

    #[test]
    fn parse_answer_call() {
        let json = r#"{"type": "answer_call", "accept": false, "target_id": "conn_aaaa0001"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::AnswerCall {
                accept: false,
                target_id: ConnectionId::from("conn_aaaa0001"),
            }
        );
    }

    #[test]
    fn parse_hang_up() {
        let json = r#"{"type": "hang_up"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, ClientMessage::HangUp);
    }

    #[test]
    fn parse_send_signal_keeps_payload_verbatim() {
        let json = r#"{"type": "send_signal", "signal": "{\"sdp\":\"v=0\\r\\n\"}", "target_id": "conn_bbbb0002"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        if let ClientMessage::SendSignal { signal, target_id } = msg {
            assert_eq!(signal, "{\"sdp\":\"v=0\\r\\n\"}");
            assert_eq!(target_id.as_str(), "conn_bbbb0002");
        } else {
            panic!("Expected SendSignal");
        }
    }

    #[test]
    fn reject_unknown_type() {
        let json = r#"{"type": "dial"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn reject_missing_field() {
        let json = r#"{"type": "answer_call", "target_id": "conn_aaaa0001"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn serialize_welcome() {
        let msg = ServerMessage::Welcome {
            your_id: ConnectionId::from("conn_new12345"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"welcome\""));
        assert!(json.contains("conn_new12345"));
    }

    #[test]
    fn serialize_update_user_list() {
        let msg = ServerMessage::UpdateUserList {
            users: vec![alice()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("update_user_list"));
        assert!(json.contains("\"in_call\":false"));
        assert!(json.contains("alice"));
    }

    #[test]
    fn serialize_call_declined() {
        let msg = ServerMessage::CallDeclined {
            user: alice(),
            reason: "busy".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("call_declined"));
        assert!(json.contains("\"reason\":\"busy\""));
    }

    #[test]
    fn serialize_receive_signal() {
        let msg = ServerMessage::ReceiveSignal {
            user: alice(),
            signal: "candidate:1 1 udp".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("receive_signal"));
        assert!(json.contains("candidate:1 1 udp"));
    }

    #[test]
    fn serialize_error() {
        let msg = ServerMessage::Error {
            message: "cannot call yourself".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("cannot call yourself"));
    }
}
