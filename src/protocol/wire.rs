//! Wire messages for the routing protocol
//!
//! Every frame is one UTF-8 JSON object with exactly one top-level key naming
//! the message kind; the value is the payload tuple. Contacts travel as
//! single-entry maps of hex CID to address. `closestNodesRequest` and
//! `closestNodesResponse` carry a request identifier so concurrent lookups can
//! pair each reply with the query that caused it.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::protocol::{Cid, Contact};

/// Largest frame accepted off the wire.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// The four message kinds of the routing protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Sender announces itself and asks to be known: (sender_addr, sender_cid).
    #[serde(rename = "nodeInfoRequest")]
    NodeInfoRequest(String, Cid),

    /// Reply carrying the responder's identity: (responder_addr, responder_cid).
    #[serde(rename = "nodeInfoResponse")]
    NodeInfoResponse(String, Cid),

    /// Ask for the closest known contacts: (sender_addr, target_cid, request_id).
    #[serde(rename = "closestNodesRequest")]
    ClosestNodesRequest(String, Cid, u64),

    /// Reply carrying up to K contacts: (request_id, contacts).
    #[serde(rename = "closestNodesResponse")]
    ClosestNodesResponse(u64, Vec<Contact>),
}

pub fn encode(message: &Message) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode(frame: &[u8]) -> Result<Message> {
    Ok(serde_json::from_slice(frame)?)
}

impl Serialize for Contact {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.cid, &self.addr)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Contact {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ContactVisitor;

        impl<'de> Visitor<'de> for ContactVisitor {
            type Value = Contact;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a single-entry map of CID to address")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Contact, A::Error> {
                let (cid, addr): (Cid, String) = access
                    .next_entry()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if access.next_entry::<Cid, String>()?.is_some() {
                    return Err(de::Error::custom("contact must carry exactly one entry"));
                }
                Ok(Contact { cid, addr })
            }
        }

        deserializer.deserialize_map(ContactVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CID_LEN;

    fn cid(fill: u8) -> Cid {
        Cid::from_bytes([fill; CID_LEN])
    }

    #[test]
    fn messages_round_trip() {
        let contacts = vec![
            Contact::new(cid(0x11), "10.0.0.1"),
            Contact::new(cid(0x22), "10.0.0.2"),
        ];
        let messages = [
            Message::NodeInfoRequest("10.0.0.9".into(), cid(0xaa)),
            Message::NodeInfoResponse("10.0.0.9".into(), cid(0xbb)),
            Message::ClosestNodesRequest("10.0.0.9".into(), cid(0xcc), 7),
            Message::ClosestNodesResponse(7, contacts),
        ];
        for message in &messages {
            let frame = encode(message).expect("encode");
            let decoded = decode(&frame).expect("decode");
            assert_eq!(&decoded, message);
        }
    }

    #[test]
    fn contact_addresses_survive_the_round_trip() {
        let original = Message::ClosestNodesResponse(3, vec![Contact::new(cid(0x44), "192.168.1.7")]);
        let decoded = decode(&encode(&original).expect("encode")).expect("decode");
        match decoded {
            Message::ClosestNodesResponse(id, contacts) => {
                assert_eq!(id, 3);
                assert_eq!(contacts.len(), 1);
                assert_eq!(contacts[0].cid, cid(0x44));
                assert_eq!(contacts[0].addr, "192.168.1.7");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn frames_are_single_key_objects() {
        let message = Message::NodeInfoRequest("10.0.0.9".into(), cid(0x01));
        let value: serde_json::Value =
            serde_json::from_slice(&encode(&message).expect("encode")).expect("json");
        let object = value.as_object().expect("object frame");
        assert_eq!(object.len(), 1);
        let payload = &object["nodeInfoRequest"];
        assert_eq!(payload[0], "10.0.0.9");
        assert_eq!(payload[1], cid(0x01).to_string());
    }

    #[test]
    fn contacts_serialize_as_cid_to_addr_maps() {
        let message = Message::ClosestNodesResponse(1, vec![Contact::new(cid(0x55), "10.1.2.3")]);
        let value: serde_json::Value =
            serde_json::from_slice(&encode(&message).expect("encode")).expect("json");
        let entry = &value["closestNodesResponse"][1][0];
        assert_eq!(entry[cid(0x55).to_string()], "10.1.2.3");
    }

    #[test]
    fn unknown_kinds_and_garbage_are_rejected() {
        assert!(decode(br#"{"storeValueRequest": ["10.0.0.1", "00"]}"#).is_err());
        assert!(decode(b"not json at all").is_err());
        assert!(decode(br#"{"nodeInfoRequest": ["10.0.0.1"]}"#).is_err());
    }
}
