//! Fixed-size message header and its wire codec
//!
//! Every message on the wire is a header followed by exactly `body_len` body
//! bytes. There is no delimiter between messages.
//!
//! ```text
//! +------+--------+----------+--------+----------+------------------+
//! | type | sender | receiver | module | body_len |  body            |
//! | i32  | i32    | i32      | i32    | i32      |  (body_len bytes)|
//! +------+--------+----------+--------+----------+------------------+
//! ```
//!
//! All fields are little-endian regardless of host platform.

use crate::error::ProtocolError;
use crate::message::{Message, MessageType, Module};
use crate::networking::PlayerId;
use byteorder::{ByteOrder, LittleEndian};

pub const HEADER_SIZE: usize = 5 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub sender: PlayerId,
    pub receiver: PlayerId,
    pub module: Module,
    pub body_len: usize,
}

impl Header {
    /// Captures the routing fields and current body length of `message`.
    ///
    /// Fails only for bodies too long for the length field.
    pub fn of(message: &Message) -> Result<Self, ProtocolError> {
        if message.size() > i32::MAX as usize {
            return Err(ProtocolError::MessageTooLarge {
                size: message.size(),
                max_size: i32::MAX as usize,
            });
        }

        Ok(Self {
            message_type: message.message_type,
            sender: message.sender,
            receiver: message.receiver,
            module: message.module,
            body_len: message.size(),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        LittleEndian::write_i32(&mut buf[0..4], self.message_type as i32);
        LittleEndian::write_i32(&mut buf[4..8], self.sender);
        LittleEndian::write_i32(&mut buf[8..12], self.receiver);
        LittleEndian::write_i32(&mut buf[12..16], self.module as i32);
        LittleEndian::write_i32(&mut buf[16..20], self.body_len as i32);
        buf
    }

    /// Decodes the first `HEADER_SIZE` bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::ShortHeader {
                len: bytes.len(),
                expected: HEADER_SIZE,
            });
        }

        let type_tag = LittleEndian::read_i32(&bytes[0..4]);
        let message_type =
            MessageType::from_i32(type_tag).ok_or(ProtocolError::UnknownMessageType(type_tag))?;

        let module_tag = LittleEndian::read_i32(&bytes[12..16]);
        let module = Module::from_i32(module_tag).ok_or(ProtocolError::UnknownModule(module_tag))?;

        let body_len = LittleEndian::read_i32(&bytes[16..20]);
        if body_len < 0 {
            return Err(ProtocolError::InvalidBodyLength(body_len));
        }

        Ok(Self {
            message_type,
            sender: LittleEndian::read_i32(&bytes[4..8]),
            receiver: LittleEndian::read_i32(&bytes[8..12]),
            module,
            body_len: body_len as usize,
        })
    }

    /// Reassembles a message from this header and a body of matching length.
    pub fn into_message(self, body: Vec<u8>) -> Message {
        debug_assert_eq!(body.len(), self.body_len);
        Message {
            message_type: self.message_type,
            sender: self.sender,
            receiver: self.receiver,
            module: self.module,
            body,
        }
    }
}

/// Header bytes for `message` as it stands right now.
pub fn encode_header(message: &Message) -> Result<[u8; HEADER_SIZE], ProtocolError> {
    Ok(Header::of(message)?.encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::{INVALID_PLAYER_ID, SERVER_PLAYER_ID};

    #[test]
    fn test_header_roundtrip() {
        let messages = vec![
            Message::join_game("Alice"),
            Message::lobby_chat(3, 7, "gg"),
            Message::dispatch_new_design_id(2, 77).unwrap(),
            Message::new(
                MessageType::TurnOrders,
                12,
                SERVER_PLAYER_ID,
                Module::Empire,
                vec![0u8; 4096],
            ),
        ];

        for message in messages {
            let header = Header::decode(&encode_header(&message).unwrap()).unwrap();
            assert_eq!(header.message_type, message.message_type);
            assert_eq!(header.sender, message.sender);
            assert_eq!(header.receiver, message.receiver);
            assert_eq!(header.module, message.module);
            assert_eq!(header.body_len, message.size());
        }
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let message = Message::new(
            MessageType::LobbyChat,
            INVALID_PLAYER_ID,
            0x0102_0304,
            Module::Lobby,
            b"abc".to_vec(),
        );
        let bytes = encode_header(&message).unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], &[9, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(&bytes[8..12], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[12..16], &[1, 0, 0, 0]);
        assert_eq!(&bytes[16..20], &[3, 0, 0, 0]);
    }

    #[test]
    fn test_identical_messages_encode_identically() {
        let a = Message::lobby_chat(1, 2, "same");
        let b = Message::lobby_chat(1, 2, "same");
        assert_eq!(encode_header(&a).unwrap(), encode_header(&b).unwrap());
    }

    #[test]
    fn test_short_header_rejected() {
        let bytes = encode_header(&Message::join_game("x")).unwrap();
        for len in 0..HEADER_SIZE {
            match Header::decode(&bytes[..len]) {
                Err(ProtocolError::ShortHeader { len: got, expected }) => {
                    assert_eq!(got, len);
                    assert_eq!(expected, HEADER_SIZE);
                }
                other => panic!("expected ShortHeader, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_invalid_fields_rejected() {
        let mut bytes = encode_header(&Message::join_game("x")).unwrap();
        LittleEndian::write_i32(&mut bytes[16..20], -5);
        assert!(matches!(
            Header::decode(&bytes),
            Err(ProtocolError::InvalidBodyLength(-5))
        ));

        let mut bytes = encode_header(&Message::join_game("x")).unwrap();
        LittleEndian::write_i32(&mut bytes[0..4], 999);
        assert!(matches!(
            Header::decode(&bytes),
            Err(ProtocolError::UnknownMessageType(999))
        ));

        let mut bytes = encode_header(&Message::join_game("x")).unwrap();
        LittleEndian::write_i32(&mut bytes[12..16], 42);
        assert!(matches!(
            Header::decode(&bytes),
            Err(ProtocolError::UnknownModule(42))
        ));
    }

    #[test]
    fn test_into_message_restores_fields() {
        let original = Message::lobby_chat(5, 6, "hello");
        let header = Header::decode(&encode_header(&original).unwrap()).unwrap();
        assert_eq!(header.into_message(original.body.clone()), original);
    }
}
