// tests/property_test.rs

//! Property-based tests for the wire codec: invariants that must hold for
//! arbitrary header values and message contents.

use fleetkeeper::core::protocol::{ApiVersion, ClientInfo, FrameHeader, decode_header, encode_header};
use prost::Message;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_header_roundtrip(
        request_id in any::<u64>(),
        message_type in any::<u64>(),
        body_len in any::<u64>(),
    ) {
        let header = FrameHeader { request_id, message_type, body_len };
        let decoded = decode_header(&encode_header(header));
        prop_assert_eq!(decoded, header);
    }

    #[test]
    fn test_client_info_body_roundtrip(
        major in 0u64..16,
        minor in 0u64..64,
        patch in 0u64..64,
        device_uuid in "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}",
        device_type in 0u64..8,
        name in ".{0,64}",
        mac in "[A-F0-9:]{0,17}",
        secret in ".{0,128}",
    ) {
        let info = ClientInfo {
            api_version: Some(ApiVersion { major, minor, patch }),
            device_uuid,
            device_type,
            name,
            mac,
            secret,
        };
        let decoded = ClientInfo::decode(info.encode_to_vec().as_slice()).unwrap();
        prop_assert_eq!(decoded, info);
    }

    #[test]
    fn test_unknown_header_fields_never_panic_decoding(buf in prop::array::uniform24(any::<u8>())) {
        // Any 24 bytes decode to some header; garbage is caught later by
        // the body-length limit and message-type table, never here.
        let header = decode_header(&buf);
        prop_assert_eq!(encode_header(header), buf);
    }
}
