//! Event emitter (C7).
//!
//! The distilled source packs every event into a 4-byte
//! `[opcode, payload_len, subtype, value]` header delivered through a single
//! callback. This core keeps that wire format only as a serialization step
//! (see [`Event::to_wire`]) and represents the event itself as a typed enum,
//! per the REDESIGN FLAGS in the design notes.

use crate::address::DeviceAddress;
use crate::lifecycle::LinkType;

/// Meta-event opcode that prefixes every packed event on the wire.
pub const HFP_META_OPCODE: u8 = 0xff;

/// Event subtype codes, in the order the distilled source defines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventSubtype {
    SlcEstablished = 0x01,
    SlcReleased = 0x02,
    AudioConnectionComplete = 0x03,
    AgIndicatorStatusChanged = 0x04,
    NetworkOperatorChanged = 0x05,
    ExtendedAudioGatewayError = 0x06,
    Complete = 0x07,
}

/// A user-visible event raised by the connection lifecycle FSM (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SlcEstablished { addr: DeviceAddress, status: u8 },
    SlcReleased { addr: DeviceAddress },
    AudioConnectionComplete { addr: DeviceAddress, link_type: LinkType },
    AgIndicatorStatusChanged { addr: DeviceAddress, index: u8, status: i32 },
    NetworkOperatorChanged { addr: DeviceAddress, mode: i32, format: i32, name: String },
    ExtendedAudioGatewayError { addr: DeviceAddress, error: u16 },
    Complete { addr: DeviceAddress },
}

impl Event {
    pub fn subtype(&self) -> EventSubtype {
        match self {
            Event::SlcEstablished { .. } => EventSubtype::SlcEstablished,
            Event::SlcReleased { .. } => EventSubtype::SlcReleased,
            Event::AudioConnectionComplete { .. } => EventSubtype::AudioConnectionComplete,
            Event::AgIndicatorStatusChanged { .. } => EventSubtype::AgIndicatorStatusChanged,
            Event::NetworkOperatorChanged { .. } => EventSubtype::NetworkOperatorChanged,
            Event::ExtendedAudioGatewayError { .. } => EventSubtype::ExtendedAudioGatewayError,
            Event::Complete { .. } => EventSubtype::Complete,
        }
    }

    /// Pack this event into the wire form `[opcode, payload_len, subtype, value...]`.
    /// Only meaningful at the point an event actually leaves the process —
    /// nothing inside the core operates on this representation.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut payload = vec![self.subtype() as u8];
        match self {
            Event::SlcEstablished { status, .. } => payload.push(*status),
            Event::SlcReleased { .. } => {}
            Event::AudioConnectionComplete { link_type, .. } => {
                payload.push(if *link_type == LinkType::Esco { 0x02 } else { 0x00 });
            }
            Event::AgIndicatorStatusChanged { index, status, .. } => {
                payload.push(*index);
                payload.push((*status).clamp(0, u8::MAX as i32) as u8);
            }
            Event::NetworkOperatorChanged { mode, format, name, .. } => {
                payload.push((*mode).clamp(0, u8::MAX as i32) as u8);
                payload.push((*format).clamp(0, u8::MAX as i32) as u8);
                payload.extend_from_slice(name.as_bytes());
            }
            Event::ExtendedAudioGatewayError { error, .. } => {
                payload.extend_from_slice(&error.to_be_bytes());
            }
            Event::Complete { .. } => {}
        }
        let mut wire = Vec::with_capacity(2 + payload.len());
        wire.push(HFP_META_OPCODE);
        wire.push(payload.len() as u8);
        wire.extend_from_slice(&payload);
        wire
    }
}

/// Delivers events to whatever the caller uses for a callback. The
/// distilled source models this as a single function pointer; this core
/// keeps that shape as a trait so tests can assert on an in-memory `Vec`.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

impl<F: FnMut(Event)> EventSink for F {
    fn emit(&mut self, event: Event) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_starts_with_meta_opcode_and_len() {
        let addr = DeviceAddress::ZERO;
        let wire = Event::SlcEstablished { addr, status: 0 }.to_wire();
        assert_eq!(wire[0], HFP_META_OPCODE);
        assert_eq!(wire[1] as usize, wire.len() - 2);
        assert_eq!(wire[2], EventSubtype::SlcEstablished as u8);
        assert_eq!(wire[3], 0);
    }

    #[test]
    fn network_operator_changed_carries_name_bytes() {
        let addr = DeviceAddress::ZERO;
        let wire = (Event::NetworkOperatorChanged {
            addr,
            mode: 0,
            format: 0,
            name: "sonera".into(),
        })
        .to_wire();
        assert!(wire.ends_with(b"sonera"));
    }
}
