//! Per-connection session state (C4).
//!
//! [`Session`] is a pure data container: the parser (`crate::parser`) is the
//! only thing that writes into it while a line is being consumed, and the
//! lifecycle FSM (`crate::lifecycle`) is the only thing that moves `state`
//! between connection phases. Nothing here blocks or owns a callback.

use bytes::BytesMut;

use crate::address::DeviceAddress;
use crate::features::{CodecId, MAX_AG_INDICATORS, MAX_CALL_SERVICES, MAX_REMOTE_CODECS};
use crate::lifecycle::ConnectionState;

/// Default line-buffer bound — the longest AT line observed in the profile
/// comfortably fits in 128 bytes; callers may raise this via [`Session::with_line_capacity`].
pub const DEFAULT_LINE_CAPACITY: usize = 128;

/// Sentinel meaning "the HF has not yet told us how to report indicator updates".
pub const INDICATOR_STATUS_UPDATE_UNSET: u8 = 0xFF;

/// Argument-parser position within the current AT line (C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Header,
    Sequence,
    SecondItem,
    ThirdItem,
}

/// Decoded AT command tag (C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    #[default]
    None,
    Error,
    Ok,
    SupportedFeatures,
    Indicator,
    AvailableCodecs,
    EnableIndicatorStatusUpdate,
    SupportCallHoldAndMultipartyServices,
    GenericStatusIndicator,
    EnableIndividualAgIndicatorStatusUpdate,
    QueryOperatorSelection,
    TransferAgIndicatorStatus,
    ExtendedAudioGatewayError,
    EnableExtendedAudioGatewayError,
    TriggerCodecConnectionSetup,
    ConfirmCommonCodec,
}

/// A single AG status indicator, as enumerated by `+CIND=?` and updated by
/// `+CIND?` / `+CIEV`.
#[derive(Debug, Clone, Default)]
pub struct AgIndicator {
    pub name: String,
    /// 1-based position on the wire.
    pub index: u8,
    pub min_range: i32,
    pub max_range: i32,
    pub status: i32,
    pub status_changed: bool,
    pub enabled: bool,
    pub mandatory: bool,
}

/// A `+BIND` generic status indicator: a UUID with a boolean enabled state.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericStatusIndicator {
    pub uuid: u16,
    pub state: bool,
}

/// `+COPS` network operator selection.
#[derive(Debug, Clone, Default)]
pub struct NetworkOperator {
    pub mode: i32,
    pub format: i32,
    pub name: String,
}

/// Pending actions the parser has queued for the (out-of-scope) command
/// scheduler to drain. The parser only ever sets these; clearing one is the
/// scheduler's responsibility once the corresponding action has been issued.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionFlags {
    pub retrieve_ag_indicators: bool,
    pub retrieve_ag_indicators_status: bool,
    pub list_generic_status_indicators: bool,
    pub retrieve_generic_status_indicators: bool,
    pub retrieve_generic_status_indicators_state: bool,
    pub change_status_update_for_individual_ag_indicators: bool,
    pub operator_name_format: bool,
    pub operator_name: bool,
    pub operator_name_changed: bool,
    pub notify_ag_on_new_codecs: bool,
    pub trigger_codec_connection_setup: bool,
    pub remote_codec_received: bool,
    pub establish_audio_connection: bool,
    pub release_audio_connection: bool,
    pub send_ok: bool,
    pub send_error: bool,
    pub wait_ok: bool,
}

impl ActionFlags {
    fn clear(&mut self) {
        *self = ActionFlags::default();
    }
}

/// One per peer device (§3). Identity fields (`remote_addr`, transport
/// handles, capability history) survive [`Session::reset_flags`]; everything
/// else is transient parse/action state.
#[derive(Debug, Clone)]
pub struct Session {
    pub remote_addr: DeviceAddress,
    pub service_uuid: u16,
    pub rfcomm_channel_nr: u8,
    pub rfcomm_cid: u16,
    pub con_handle: u16,
    pub sco_handle: u16,
    pub state: ConnectionState,

    // Parser cursor (C1-C3).
    pub parser_state: ParserState,
    pub command: Command,
    line_buffer: BytesMut,
    line_capacity: usize,
    pub keep_separator: bool,
    pub parser_item_index: usize,
    pub is_hands_free_side: bool,

    // Capability set.
    pub remote_supported_features: u32,
    pub remote_codecs: Vec<u16>,
    pub remote_call_services: Vec<String>,
    pub negotiated_codec: CodecId,

    pub ag_indicators: Vec<AgIndicator>,
    pub generic_status_indicators: Vec<GenericStatusIndicator>,
    pub network_operator: NetworkOperator,

    pub enable_extended_audio_gateway_error_report: bool,
    pub extended_audio_gateway_error: u16,
    pub enable_status_update_for_ag_indicators: u8,

    /// Codec ids this side advertises locally via `+BAC`; populated by
    /// [`Session::set_codecs`], not by the parser (§6 upward interface).
    pub local_codecs: Vec<u16>,
    /// Generic status indicator UUIDs this side advertises locally via
    /// `+BIND=`; populated by [`Session::set_generic_status_indicators`].
    pub local_generic_status_indicators: Vec<u16>,
    /// Bitmap from the most recent [`Session::enable_status_update_for_individual_ag_indicators`]
    /// call, mirrored onto `ag_indicators[i].enabled` one bit per indicator.
    pub individual_ag_indicator_status_update_bitmap: u32,

    pub actions: ActionFlags,
}

impl Session {
    pub fn new(remote_addr: DeviceAddress) -> Self {
        Session {
            remote_addr,
            service_uuid: 0,
            rfcomm_channel_nr: 0,
            rfcomm_cid: 0,
            con_handle: 0,
            sco_handle: 0,
            state: ConnectionState::Idle,
            parser_state: ParserState::default(),
            command: Command::default(),
            line_buffer: BytesMut::with_capacity(DEFAULT_LINE_CAPACITY),
            line_capacity: DEFAULT_LINE_CAPACITY,
            keep_separator: false,
            parser_item_index: 0,
            is_hands_free_side: false,
            remote_supported_features: 0,
            remote_codecs: Vec::with_capacity(MAX_REMOTE_CODECS),
            remote_call_services: Vec::with_capacity(MAX_CALL_SERVICES),
            negotiated_codec: CodecId::default(),
            ag_indicators: Vec::with_capacity(MAX_AG_INDICATORS),
            generic_status_indicators: Vec::new(),
            network_operator: NetworkOperator::default(),
            enable_extended_audio_gateway_error_report: false,
            extended_audio_gateway_error: 0,
            enable_status_update_for_ag_indicators: INDICATOR_STATUS_UPDATE_UNSET,
            local_codecs: Vec::new(),
            local_generic_status_indicators: Vec::new(),
            individual_ag_indicator_status_update_bitmap: 0,
            actions: ActionFlags::default(),
        }
    }

    pub fn with_line_capacity(mut self, capacity: usize) -> Self {
        self.line_capacity = capacity;
        self
    }

    pub fn line_capacity(&self) -> usize {
        self.line_capacity
    }

    pub fn line_buffer(&self) -> &[u8] {
        &self.line_buffer
    }

    pub fn line_size(&self) -> usize {
        self.line_buffer.len()
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.line_buffer
    }

    pub(crate) fn clear_buffer(&mut self) {
        self.line_buffer.clear();
    }

    /// Raise `negotiated_codec` if `candidate` advertises a higher codec id;
    /// never lowers it (§3 invariant, §9 resolved-bug note).
    pub fn offer_codec(&mut self, candidate: CodecId) {
        if candidate > self.negotiated_codec {
            self.negotiated_codec = candidate;
        }
    }

    /// Clear all action flags and transient parse state, preserving identity
    /// (address, transport handles, capability history) — see §4.4.
    pub fn reset_flags(&mut self) {
        self.actions.clear();
        self.parser_state = ParserState::default();
        self.command = Command::default();
        self.line_buffer.clear();
        self.keep_separator = false;
        self.parser_item_index = 0;
    }

    // ---- §6 upward interface: each queues an action flag or local config
    // for the (out-of-scope) scheduler to act on, and returns immediately. ----

    /// Set the codec ids this side will advertise via `+BAC`.
    pub fn set_codecs(&mut self, codecs: Vec<u16>) {
        self.local_codecs = codecs;
        self.actions.notify_ag_on_new_codecs = true;
    }

    /// Set the generic status indicator UUIDs this side will advertise via `+BIND=`.
    pub fn set_generic_status_indicators(&mut self, indicators: Vec<u16>) {
        self.local_generic_status_indicators = indicators;
    }

    /// Queue an `AT+COPS?` / `+COPS` request for the current network operator.
    pub fn query_operator_selection(&mut self) {
        self.actions.operator_name = true;
    }

    /// Request that the peer start (or stop) sending unsolicited AG indicator
    /// status updates, mirroring `AT+CMER`'s enable bit.
    pub fn enable_status_update_for_ag_indicators(&mut self, enable: bool) {
        self.enable_status_update_for_ag_indicators = u8::from(enable);
    }

    /// Select, per-indicator, whether status updates are reported for it
    /// (one bit per `ag_indicators` position), mirroring `AT+BIA`.
    pub fn enable_status_update_for_individual_ag_indicators(&mut self, bitmap: u32) {
        self.individual_ag_indicator_status_update_bitmap = bitmap;
        for (idx, indicator) in self.ag_indicators.iter_mut().enumerate() {
            if !indicator.mandatory {
                indicator.enabled = bitmap & (1 << idx) != 0;
            }
        }
        self.actions.change_status_update_for_individual_ag_indicators = true;
    }

    /// Enable or disable `+CME ERROR:` extended error reporting, mirroring `AT+CMEE`.
    pub fn enable_report_extended_audio_gateway_error_result_code(&mut self, enable: bool) {
        self.enable_extended_audio_gateway_error_report = enable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_quiescent() {
        let s = Session::new(DeviceAddress::ZERO);
        assert_eq!(s.parser_state, ParserState::Header);
        assert_eq!(s.line_size(), 0);
        assert_eq!(s.enable_status_update_for_ag_indicators, INDICATOR_STATUS_UPDATE_UNSET);
        assert_eq!(s.negotiated_codec, CodecId::Cvsd);
    }

    #[test]
    fn offer_codec_never_lowers() {
        let mut s = Session::new(DeviceAddress::ZERO);
        s.offer_codec(CodecId::Msbc);
        assert_eq!(s.negotiated_codec, CodecId::Msbc);
        s.offer_codec(CodecId::Cvsd);
        assert_eq!(s.negotiated_codec, CodecId::Msbc);
    }

    #[test]
    fn reset_flags_preserves_identity() {
        let addr = DeviceAddress::new([1, 2, 3, 4, 5, 6]);
        let mut s = Session::new(addr);
        s.rfcomm_cid = 7;
        s.remote_supported_features = 42;
        s.actions.send_ok = true;
        s.parser_state = ParserState::Sequence;
        s.reset_flags();
        assert_eq!(s.remote_addr, addr);
        assert_eq!(s.rfcomm_cid, 7);
        assert_eq!(s.remote_supported_features, 42);
        assert!(!s.actions.send_ok);
        assert_eq!(s.parser_state, ParserState::Header);
    }

    #[test]
    fn set_codecs_stores_list_and_flags_notify() {
        let mut s = Session::new(DeviceAddress::ZERO);
        s.set_codecs(vec![1, 2]);
        assert_eq!(s.local_codecs, vec![1, 2]);
        assert!(s.actions.notify_ag_on_new_codecs);
    }

    #[test]
    fn query_operator_selection_sets_operator_name_flag() {
        let mut s = Session::new(DeviceAddress::ZERO);
        s.query_operator_selection();
        assert!(s.actions.operator_name);
    }

    #[test]
    fn enable_individual_ag_indicators_mirrors_bitmap_onto_non_mandatory_indicators() {
        let mut s = Session::new(DeviceAddress::ZERO);
        s.ag_indicators.push(AgIndicator { name: "service".into(), index: 1, mandatory: false, ..Default::default() });
        s.ag_indicators.push(AgIndicator { name: "call".into(), index: 2, mandatory: true, ..Default::default() });
        s.enable_status_update_for_individual_ag_indicators(0b01);
        assert!(s.ag_indicators[0].enabled);
        assert!(!s.ag_indicators[1].enabled);
        assert!(s.actions.change_status_update_for_individual_ag_indicators);
    }

    #[test]
    fn enable_report_extended_error_sets_session_flag() {
        let mut s = Session::new(DeviceAddress::ZERO);
        s.enable_report_extended_audio_gateway_error_result_code(true);
        assert!(s.enable_extended_audio_gateway_error_report);
    }
}
