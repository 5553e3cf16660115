//! SDP service record builder (C8).
//!
//! The distilled source builds this record by pushing/popping nested
//! sequences directly into a caller-supplied byte buffer (`de_push_sequence`/
//! `de_pop_sequence` in `hfp_create_sdp_record`). This core instead builds an
//! owned [`DataElement`] tree and encodes it in one pass — easier to unit
//! test a sub-tree in isolation, same on-the-wire result.

/// SDP attribute IDs used by the handsfree service record.
pub mod attribute {
    pub const SERVICE_RECORD_HANDLE: u16 = 0x0000;
    pub const SERVICE_CLASS_ID_LIST: u16 = 0x0001;
    pub const PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;
    pub const BROWSE_GROUP_LIST: u16 = 0x0005;
    pub const BLUETOOTH_PROFILE_DESCRIPTOR_LIST: u16 = 0x0009;
    pub const SERVICE_NAME: u16 = 0x0100;
}

/// Well-known UUIDs the record references.
pub mod uuid {
    pub const GENERIC_AUDIO: u16 = 0x1203;
    pub const L2CAP_PROTOCOL: u16 = 0x0100;
    pub const RFCOMM_PROTOCOL: u16 = 0x0003;
    pub const PUBLIC_BROWSE_GROUP: u16 = 0x1002;
    pub const HANDSFREE_PROFILE: u16 = 0x111e;
}

/// Handsfree profile version advertised in the profile descriptor list (1.7).
pub const HANDSFREE_PROFILE_VERSION: u16 = 0x0107;

/// A node in an SDP data-element tree (§4.8). Encodes to the standard
/// `[type<<3 | size_descriptor, length?, payload]` TLV form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataElement {
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Uuid16(u16),
    Text(String),
    Sequence(Vec<DataElement>),
}

const TYPE_UINT: u8 = 1;
const TYPE_UUID: u8 = 3;
const TYPE_TEXT: u8 = 4;
const TYPE_SEQUENCE: u8 = 6;

impl DataElement {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            DataElement::UInt8(v) => Self::fixed_header(TYPE_UINT, 0, &[*v]),
            DataElement::UInt16(v) => Self::fixed_header(TYPE_UINT, 1, &v.to_be_bytes()),
            DataElement::UInt32(v) => Self::fixed_header(TYPE_UINT, 2, &v.to_be_bytes()),
            DataElement::Uuid16(v) => Self::fixed_header(TYPE_UUID, 1, &v.to_be_bytes()),
            DataElement::Text(s) => Self::variable(TYPE_TEXT, s.as_bytes()),
            DataElement::Sequence(items) => {
                let payload: Vec<u8> = items.iter().flat_map(|item| item.encode()).collect();
                Self::variable(TYPE_SEQUENCE, &payload)
            }
        }
    }

    fn fixed_header(kind: u8, size_descriptor: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push((kind << 3) | size_descriptor);
        out.extend_from_slice(payload);
        out
    }

    /// Variable-length element: picks the smallest of the three
    /// additional-length-field encodings (one/two/four-byte count) that fits.
    fn variable(kind: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + payload.len());
        if payload.len() <= u8::MAX as usize {
            out.push((kind << 3) | 5);
            out.push(payload.len() as u8);
        } else if payload.len() <= u16::MAX as usize {
            out.push((kind << 3) | 6);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        } else {
            out.push((kind << 3) | 7);
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        }
        out.extend_from_slice(payload);
        out
    }
}

/// Build the handsfree service record described in the design notes: service
/// class list, L2CAP/RFCOMM protocol descriptor, public browse group,
/// handsfree profile descriptor, service name, and the advertised feature
/// bitmap as a trailing raw attribute (§4.8).
pub fn build_service_record(service_uuid: u16, rfcomm_channel_nr: u8, name: &str, supported_features: u16) -> Vec<u8> {
    use DataElement::*;

    let record = Sequence(vec![
        UInt16(attribute::SERVICE_RECORD_HANDLE),
        UInt32(0x0001_0001),
        UInt16(attribute::SERVICE_CLASS_ID_LIST),
        Sequence(vec![Uuid16(service_uuid), Uuid16(uuid::GENERIC_AUDIO)]),
        UInt16(attribute::PROTOCOL_DESCRIPTOR_LIST),
        Sequence(vec![
            Sequence(vec![Uuid16(uuid::L2CAP_PROTOCOL)]),
            Sequence(vec![Uuid16(uuid::RFCOMM_PROTOCOL), UInt8(rfcomm_channel_nr)]),
        ]),
        UInt16(attribute::BROWSE_GROUP_LIST),
        Sequence(vec![Uuid16(uuid::PUBLIC_BROWSE_GROUP)]),
        UInt16(attribute::BLUETOOTH_PROFILE_DESCRIPTOR_LIST),
        Sequence(vec![Sequence(vec![
            Uuid16(uuid::HANDSFREE_PROFILE),
            UInt16(HANDSFREE_PROFILE_VERSION),
        ])]),
        UInt16(attribute::SERVICE_NAME),
        Text(name.to_string()),
        UInt16(supported_features),
    ]);

    record.encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint16_encodes_as_two_byte_fixed_element() {
        let encoded = DataElement::UInt16(0x1234).encode();
        assert_eq!(encoded, vec![(TYPE_UINT << 3) | 1, 0x12, 0x34]);
    }

    #[test]
    fn text_encodes_with_one_byte_length_for_short_strings() {
        let encoded = DataElement::Text("AG".into()).encode();
        assert_eq!(encoded, vec![(TYPE_TEXT << 3) | 5, 2, b'A', b'G']);
    }

    #[test]
    fn sequence_length_counts_encoded_children_not_element_count() {
        let seq = DataElement::Sequence(vec![DataElement::UInt8(1), DataElement::UInt8(2)]);
        let encoded = seq.encode();
        assert_eq!(encoded[0], (TYPE_SEQUENCE << 3) | 5);
        assert_eq!(encoded[1], 4); // two 2-byte UInt8 elements
    }

    #[test]
    fn service_record_opens_with_a_top_level_sequence() {
        let record = build_service_record(0x111f, 3, "Handsfree", 0x001f);
        assert_eq!(record[0] >> 3, TYPE_SEQUENCE);
        assert!(matches!(record[0] & 0x07, 5 | 6 | 7));
        let needle = b"Handsfree";
        assert!(record.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn service_record_embeds_rfcomm_channel_number() {
        let record = build_service_record(0x111f, 7, "AG", 0);
        assert!(record.contains(&7));
    }
}
