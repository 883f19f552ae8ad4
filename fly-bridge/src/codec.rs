//! JSON codec shared by the call gateway and the event sink.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::naming::NamingPolicy;
use crate::wire_de::WireDeserializer;
use crate::wire_ser::to_wire;

/// Encodes host values to wire JSON and back. Struct fields and enum variants are renamed with the
/// naming policy; decoding matches wire names back onto the type's own identifiers, so
/// `decode(encode(x)) == x` whatever casing the host type uses. Map keys are data and never
/// renamed. Immutable and `Copy`, so every call and the sink hold their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    policy: NamingPolicy,
}

impl Codec {
    pub fn new(policy: NamingPolicy) -> Self {
        Self { policy }
    }

    /// Serialize `value` into a wire string.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<String> {
        match self.policy {
            NamingPolicy::Preserve => serde_json::to_string(value),
            policy => serde_json::to_string(&to_wire(value, policy)?),
        }
    }

    /// Parse a wire string into `T`. Natives that answer in another casing still land on the
    /// right fields.
    pub fn decode<T: DeserializeOwned>(&self, raw: &str) -> serde_json::Result<T> {
        match self.policy {
            NamingPolicy::Preserve => serde_json::from_str(raw),
            policy => {
                let value: Value = serde_json::from_str(raw)?;
                T::deserialize(WireDeserializer::new(value, policy))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct HostShaped {
        peer_id: String,
        auto_accept: bool,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Nested {
        session_id: u64,
        peers: Vec<Inner>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Inner {
        display_name: String,
    }

    #[test]
    fn encode_rewrites_foreign_casing() {
        let codec = Codec::default();
        let raw = codec
            .encode(&HostShaped {
                peer_id: "a1".into(),
                auto_accept: true,
            })
            .unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["peer_id"], "a1");
        assert_eq!(v["auto_accept"], true);
        assert!(v.get("peerId").is_none());
    }

    #[test]
    fn decode_accepts_camel_case_native_payload() {
        let codec = Codec::default();
        let got: Nested = codec
            .decode(r#"{"sessionId": 7, "peers": [{"displayName": "desk"}]}"#)
            .unwrap();
        assert_eq!(
            got,
            Nested {
                session_id: 7,
                peers: vec![Inner {
                    display_name: "desk".into()
                }]
            }
        );
    }

    #[test]
    fn snake_case_types_survive_a_trip() {
        let codec = Codec::default();
        let value = Nested {
            session_id: 42,
            peers: vec![Inner {
                display_name: "laptop".into(),
            }],
        };
        let back: Nested = codec.decode(&codec.encode(&value).unwrap()).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn preserve_leaves_keys_alone() {
        let codec = Codec::new(NamingPolicy::Preserve);
        let raw = codec
            .encode(&HostShaped {
                peer_id: "a1".into(),
                auto_accept: false,
            })
            .unwrap();
        assert!(raw.contains("peerId"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let codec = Codec::default();
        assert!(codec.decode::<Nested>("{not json").is_err());
        assert!(codec.decode::<Nested>(r#"{"session_id": "x"}"#).is_err());
    }

    #[test]
    fn camel_case_type_survives_a_trip() {
        let codec = Codec::default();
        let value = HostShaped {
            peer_id: "a".into(),
            auto_accept: true,
        };
        let raw = codec.encode(&value).unwrap();
        assert_eq!(raw, r#"{"auto_accept":true,"peer_id":"a"}"#);
        let back: HostShaped = codec.decode(&raw).unwrap();
        assert_eq!(back, value);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Plain {
        FastMode,
        SendPeer(u8),
        PairWith(String, u16),
        Rename {
            #[serde(rename = "newName")]
            new_name: String,
        },
    }

    #[test]
    fn default_cased_enum_is_uniformly_snake_case() {
        let codec = Codec::default();
        assert_eq!(codec.encode(&Plain::FastMode).unwrap(), r#""fast_mode""#);
        assert_eq!(codec.encode(&Plain::SendPeer(3)).unwrap(), r#"{"send_peer":3}"#);
        assert_eq!(
            codec
                .encode(&Plain::Rename {
                    new_name: "x".into()
                })
                .unwrap(),
            r#"{"rename":{"new_name":"x"}}"#
        );
        for value in [
            Plain::FastMode,
            Plain::SendPeer(3),
            Plain::PairWith("p".into(), 9),
            Plain::Rename {
                new_name: "desk".into(),
            },
        ] {
            let back: Plain = codec.decode(&codec.encode(&value).unwrap()).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn data_map_keys_are_not_renamed() {
        let codec = Codec::default();
        let mut labels = BTreeMap::new();
        labels.insert("PeerId".to_owned(), 1u8);
        labels.insert("display-name".to_owned(), 2u8);
        let raw = codec.encode(&labels).unwrap();
        assert_eq!(raw, r#"{"PeerId":1,"display-name":2}"#);
        let back: BTreeMap<String, u8> = codec.decode(&raw).unwrap();
        assert_eq!(back, labels);

        let mut by_session = BTreeMap::new();
        by_session.insert(7u64, Inner {
            display_name: "desk".into(),
        });
        let back: BTreeMap<u64, Inner> = codec.decode(&codec.encode(&by_session).unwrap()).unwrap();
        assert_eq!(back, by_session);
    }

    #[test]
    fn tuple_length_is_checked() {
        let codec = Codec::default();
        assert!(codec.decode::<Plain>(r#"{"pair_with": ["p", 9, 10]}"#).is_err());
        assert!(codec.decode::<Plain>(r#"{"send_peer": 1, "fast_mode": null}"#).is_err());
    }
}
