//! Connection lifecycle state machine (C6).
//!
//! Drives a [`Session`] through SDP query, RFCOMM connection, SLC handshake,
//! and audio-link setup/teardown, reacting to events raised by the (external)
//! RFCOMM/SDP/HCI collaborators named in §6. The scheduling model is
//! single-threaded cooperative (§5): every transition here runs to completion
//! before the next event is dispatched, so [`HfpContext`] needs no locking.

use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::error::{HfpError, Result};
use crate::event::{Event, EventSink};
use crate::registry::Registry;
use crate::session::Session;
use crate::transport::{HciTransport, RfcommTransport, SdpTransport};

/// Phase of the connection lifecycle (§4.6). Initial = `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    W4SdpQueryComplete,
    W4RfcommConnected,
    ExchangeSupportedFeatures,
    ServiceLevelConnectionEstablished,
    AudioConnectionEstablished,
    W2DisconnectRfcomm,
    W4ConnectionEstablishedToShutdown,
    W2DisconnectSco,
    W4RfcommDisconnected,
    W4RfcommDisconnectedAndRestart,
}

/// Link type reported by a synchronous-connection-complete event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Sco,
    Esco,
}

/// Everything the outer run loop owns and threads through the core: the
/// session registry plus the single outstanding-SDP-query slot (§9 — the
/// global mutable state from the distilled source, reframed as an ordinary
/// owned value instead of a process-wide singleton).
#[derive(Default)]
pub struct HfpContext {
    pub registry: Registry,
    sdp_query_in_flight: Option<DeviceAddress>,
}

impl HfpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while an SDP query this context issued has not yet completed.
    pub fn sdp_query_in_flight(&self) -> bool {
        self.sdp_query_in_flight.is_some()
    }

    /// Begin SLC establishment for `addr`: IDLE → W4_SDP_QUERY_COMPLETE, or
    /// resume a pending restart/disconnect as described in §4.6.
    pub fn establish_slc<S: SdpTransport>(
        &mut self,
        addr: DeviceAddress,
        service_uuid: u16,
        sdp: &mut S,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let session = self.registry.provide(addr);
        session.service_uuid = service_uuid;
        match session.state {
            ConnectionState::Idle => {
                session.state = ConnectionState::W4SdpQueryComplete;
                self.sdp_query_in_flight = Some(addr);
                sdp.query_rfcomm_channel_for_uuid(addr, service_uuid);
                debug!(%addr, uuid = service_uuid, "SDP query issued");
                Ok(())
            }
            ConnectionState::W4RfcommDisconnected => {
                session.state = ConnectionState::W4RfcommDisconnectedAndRestart;
                Ok(())
            }
            ConnectionState::W2DisconnectRfcomm => {
                session.state = ConnectionState::ServiceLevelConnectionEstablished;
                Ok(())
            }
            other => {
                warn!(%addr, state = ?other, "establish_slc called from unexpected state");
                Err(HfpError::InvalidTransition {
                    operation: "establish_slc",
                    state: state_name(other),
                })
            }
        }
    }

    /// `release_slc()` — §4.6: SLE → W2_DISCONNECT_RFCOMM; W4_RFCOMM_CONNECTED
    /// → W4_CONNECTION_ESTABLISHED_TO_SHUTDOWN.
    pub fn release_slc(&mut self, addr: DeviceAddress) -> Result<()> {
        let session = self
            .registry
            .by_addr_mut(addr)
            .ok_or(HfpError::SessionNotFound(addr))?;
        match session.state {
            ConnectionState::ServiceLevelConnectionEstablished => {
                session.state = ConnectionState::W2DisconnectRfcomm;
                Ok(())
            }
            ConnectionState::W4RfcommConnected => {
                session.state = ConnectionState::W4ConnectionEstablishedToShutdown;
                Ok(())
            }
            other => Err(HfpError::InvalidTransition {
                operation: "release_slc",
                state: state_name(other),
            }),
        }
    }

    /// Request the synchronous (SCO/eSCO) link. A no-op outside SLE (§4.6).
    pub fn establish_audio_connection<H: HciTransport>(
        &mut self,
        addr: DeviceAddress,
        hci: &mut H,
    ) -> Result<()> {
        let session = self
            .registry
            .by_addr_mut(addr)
            .ok_or(HfpError::SessionNotFound(addr))?;
        if session.state != ConnectionState::ServiceLevelConnectionEstablished {
            warn!(%addr, state = ?session.state, "establish_audio_connection outside SLE, ignoring");
            return Ok(());
        }
        session.actions.establish_audio_connection = true;
        hci.setup_synchronous_connection(session.con_handle);
        Ok(())
    }

    /// Tear down the synchronous link: AUDIO_CONNECTION_ESTABLISHED → W2_DISCONNECT_SCO.
    pub fn release_audio_connection<H: HciTransport>(
        &mut self,
        addr: DeviceAddress,
        hci: &mut H,
    ) -> Result<()> {
        let session = self
            .registry
            .by_addr_mut(addr)
            .ok_or(HfpError::SessionNotFound(addr))?;
        if session.state != ConnectionState::AudioConnectionEstablished {
            warn!(%addr, state = ?session.state, "release_audio_connection outside audio-established, ignoring");
            return Ok(());
        }
        session.state = ConnectionState::W2DisconnectSco;
        hci.disconnect(session.sco_handle);
        Ok(())
    }

    /// SDP `RFCOMM_SERVICE` event: records the discovered channel number.
    pub fn on_sdp_rfcomm_service(&mut self, addr: DeviceAddress, channel_nr: u8) {
        if let Some(session) = self.registry.by_addr_mut(addr) {
            session.rfcomm_channel_nr = channel_nr;
        }
    }

    /// SDP `QUERY_COMPLETE` event.
    pub fn on_sdp_query_complete<R: RfcommTransport>(
        &mut self,
        addr: DeviceAddress,
        status: u8,
        rfcomm: &mut R,
    ) {
        self.sdp_query_in_flight = None;
        let Some(session) = self.registry.by_addr_mut(addr) else {
            return;
        };
        if session.state != ConnectionState::W4SdpQueryComplete {
            return;
        }
        if status == 0 && session.rfcomm_channel_nr > 0 {
            session.state = ConnectionState::W4RfcommConnected;
            rfcomm.create_channel(addr, session.rfcomm_channel_nr);
        } else {
            warn!(%addr, status, "SDP query failed to resolve an RFCOMM channel");
        }
    }

    /// Incoming RFCOMM connection on `addr`; accepted only while IDLE (§4.6).
    pub fn on_rfcomm_incoming<R: RfcommTransport>(
        &mut self,
        addr: DeviceAddress,
        cid: u16,
        service_uuid: u16,
        rfcomm: &mut R,
    ) {
        let session = self.registry.provide(addr);
        if session.state != ConnectionState::Idle {
            warn!(%addr, state = ?session.state, "rejecting incoming RFCOMM connection, session busy");
            return;
        }
        session.service_uuid = service_uuid;
        session.rfcomm_cid = cid;
        session.state = ConnectionState::W4RfcommConnected;
        self.registry.index_cid(cid, addr);
        rfcomm.accept(cid);
    }

    /// RFCOMM `OPEN_CHANNEL_COMPLETE` event. Also binds `con_handle`, the HCI
    /// connection handle carried on this event in the distilled source
    /// (`original_source/src/hfp.c`'s `READ_BT_16(packet, 9)`), so later HCI
    /// events keyed by handle (`on_hci_disconnection_complete`) can find the
    /// session, and indexes both `cid` and `con_handle` in the registry so
    /// the by-cid/by-handle lookup paths in §4.5 resolve outbound sessions
    /// the same way the incoming-connection path already does.
    pub fn on_rfcomm_open_complete(
        &mut self,
        addr: DeviceAddress,
        cid: u16,
        con_handle: u16,
        status: u8,
        sink: &mut impl EventSink,
    ) {
        if status != 0 {
            sink.emit(Event::SlcEstablished { addr, status });
            self.registry.remove(addr);
            return;
        }
        let Some(session) = self.registry.by_addr_mut(addr) else {
            return;
        };
        session.rfcomm_cid = cid;
        session.con_handle = con_handle;
        match session.state {
            ConnectionState::W4RfcommConnected => {
                session.state = ConnectionState::ExchangeSupportedFeatures;
                info!(%addr, "RFCOMM connected, exchanging supported features");
            }
            ConnectionState::W4ConnectionEstablishedToShutdown => {
                session.state = ConnectionState::W2DisconnectRfcomm;
            }
            other => {
                warn!(%addr, state = ?other, "unexpected open-complete state");
            }
        }
        self.registry.index_cid(cid, addr);
        self.registry.index_handle(con_handle, addr);
    }

    /// The SLC handshake (feature exchange + indicator dialog) has
    /// completed; call once the scheduler observes `command == Command::Ok`
    /// (or the final AT dialog step) while in `ExchangeSupportedFeatures`.
    pub fn on_slc_established(&mut self, addr: DeviceAddress, sink: &mut impl EventSink) {
        if let Some(session) = self.registry.by_addr_mut(addr) {
            if session.state == ConnectionState::ExchangeSupportedFeatures {
                session.state = ConnectionState::ServiceLevelConnectionEstablished;
                sink.emit(Event::SlcEstablished { addr, status: 0 });
            }
        }
    }

    /// RFCOMM `CHANNEL_CLOSED` event; same restart-or-terminate semantics as
    /// HCI disconnection, keyed here by address rather than `con_handle`.
    pub fn on_rfcomm_channel_closed<S: SdpTransport>(
        &mut self,
        addr: DeviceAddress,
        sdp: &mut S,
        sink: &mut impl EventSink,
    ) {
        let Some(session) = self.registry.by_addr_mut(addr) else {
            return;
        };
        if session.state == ConnectionState::W4RfcommDisconnectedAndRestart {
            let uuid = session.service_uuid;
            session.state = ConnectionState::Idle;
            let _ = self.establish_slc(addr, uuid, sdp, sink);
        } else {
            self.registry.remove(addr);
            sink.emit(Event::SlcReleased { addr });
        }
    }

    /// HCI `DISCONNECTION_COMPLETE` event, keyed by `con_handle` (§4.6).
    pub fn on_hci_disconnection_complete<S: SdpTransport>(
        &mut self,
        con_handle: u16,
        sdp: &mut S,
        sink: &mut impl EventSink,
    ) {
        let Some(addr) = self.registry.addr_for_handle(con_handle) else {
            return;
        };
        self.on_rfcomm_channel_closed(addr, sdp, sink);
    }

    /// HCI `SYNCHRONOUS_CONNECTION_COMPLETE` event.
    pub fn on_synchronous_connection_complete(
        &mut self,
        addr: DeviceAddress,
        status: u8,
        sco_handle: u16,
        link_type: LinkType,
        sink: &mut impl EventSink,
    ) {
        let Some(session) = self.registry.by_addr_mut(addr) else {
            return;
        };
        if status != 0 {
            warn!(%addr, status, "synchronous connection failed");
            return;
        }
        match session.state {
            ConnectionState::W4ConnectionEstablishedToShutdown => {
                session.state = ConnectionState::W2DisconnectSco;
            }
            _ => {
                session.sco_handle = sco_handle;
                session.state = ConnectionState::AudioConnectionEstablished;
                sink.emit(Event::AudioConnectionComplete { addr, link_type });
            }
        }
    }
}

fn state_name(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Idle => "Idle",
        ConnectionState::W4SdpQueryComplete => "W4SdpQueryComplete",
        ConnectionState::W4RfcommConnected => "W4RfcommConnected",
        ConnectionState::ExchangeSupportedFeatures => "ExchangeSupportedFeatures",
        ConnectionState::ServiceLevelConnectionEstablished => "ServiceLevelConnectionEstablished",
        ConnectionState::AudioConnectionEstablished => "AudioConnectionEstablished",
        ConnectionState::W2DisconnectRfcomm => "W2DisconnectRfcomm",
        ConnectionState::W4ConnectionEstablishedToShutdown => "W4ConnectionEstablishedToShutdown",
        ConnectionState::W2DisconnectSco => "W2DisconnectSco",
        ConnectionState::W4RfcommDisconnected => "W4RfcommDisconnected",
        ConnectionState::W4RfcommDisconnectedAndRestart => "W4RfcommDisconnectedAndRestart",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::transport::test_support::FakeTransport;

    fn addr() -> DeviceAddress {
        DeviceAddress::new([1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn establish_slc_issues_sdp_query_from_idle() {
        let mut ctx = HfpContext::new();
        let mut fake = FakeTransport::default();
        let mut events = Vec::new();
        ctx.establish_slc(addr(), 0x111f, &mut fake, &mut events).unwrap();
        assert!(ctx.sdp_query_in_flight());
        assert_eq!(fake.sdp_queries, vec![(addr(), 0x111f)]);
        assert_eq!(
            ctx.registry.by_addr(addr()).unwrap().state,
            ConnectionState::W4SdpQueryComplete
        );
    }

    #[test]
    fn sdp_result_then_complete_requests_rfcomm_channel() {
        let mut ctx = HfpContext::new();
        let mut fake = FakeTransport::default();
        let mut events = Vec::new();
        ctx.establish_slc(addr(), 0x111f, &mut fake, &mut events).unwrap();
        ctx.on_sdp_rfcomm_service(addr(), 3);
        ctx.on_sdp_query_complete(addr(), 0, &mut fake);
        assert!(!ctx.sdp_query_in_flight());
        assert_eq!(
            ctx.registry.by_addr(addr()).unwrap().state,
            ConnectionState::W4RfcommConnected
        );
        assert_eq!(fake.rfcomm_channels_created, vec![(addr(), 3)]);
    }

    #[test]
    fn restart_on_disconnect_reissues_establish_slc_without_slc_released() {
        let mut ctx = HfpContext::new();
        let mut fake = FakeTransport::default();
        let mut events: Vec<Event> = Vec::new();
        ctx.establish_slc(addr(), 0x111f, &mut fake, &mut events).unwrap();
        ctx.registry.by_addr_mut(addr()).unwrap().state =
            ConnectionState::W4RfcommDisconnectedAndRestart;
        ctx.on_rfcomm_channel_closed(addr(), &mut fake, &mut events);
        assert_eq!(
            ctx.registry.by_addr(addr()).unwrap().state,
            ConnectionState::W4SdpQueryComplete
        );
        assert!(events.iter().all(|e| !matches!(e, Event::SlcReleased { .. })));
    }

    #[test]
    fn hci_disconnection_complete_finds_session_bound_on_open_complete() {
        let mut ctx = HfpContext::new();
        let mut fake = FakeTransport::default();
        let mut events: Vec<Event> = Vec::new();
        ctx.establish_slc(addr(), 0x111f, &mut fake, &mut events).unwrap();
        ctx.on_sdp_rfcomm_service(addr(), 3);
        ctx.on_sdp_query_complete(addr(), 0, &mut fake);
        ctx.on_rfcomm_open_complete(addr(), 11, 22, 0, &mut events);
        assert_eq!(ctx.registry.by_addr(addr()).unwrap().con_handle, 22);
        assert_eq!(ctx.registry.addr_for_cid(11), Some(addr()));
        assert_eq!(ctx.registry.addr_for_handle(22), Some(addr()));

        ctx.on_hci_disconnection_complete(22, &mut fake, &mut events);
        assert!(ctx.registry.by_addr(addr()).is_none());
        assert!(events.iter().any(|e| matches!(e, Event::SlcReleased { addr: a } if *a == addr())));
    }

    #[test]
    fn audio_connection_requires_established_slc() {
        let mut ctx = HfpContext::new();
        let mut fake = FakeTransport::default();
        ctx.registry.provide(addr());
        assert!(ctx.establish_audio_connection(addr(), &mut fake).is_ok());
        assert!(fake.synchronous_setups.is_empty());
    }
}
