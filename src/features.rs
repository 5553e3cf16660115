//! Feature bitmaps and codec identifiers exchanged during SLC establishment.

use bitflags::bitflags;

bitflags! {
    /// `AT+BRSF` bitmap as advertised by the HF side.
    #[derive(Default)]
    pub struct HfFeatures: u32 {
        const EC_NR                         = 0b0000_0000_0001;
        const THREE_WAY_CALLING             = 0b0000_0000_0010;
        const CLI_PRESENTATION              = 0b0000_0000_0100;
        const VOICE_RECOGNITION             = 0b0000_0000_1000;
        const REMOTE_VOLUME_CONTROL         = 0b0000_0001_0000;
        const ENHANCED_CALL_STATUS          = 0b0000_0010_0000;
        const ENHANCED_CALL_CONTROL         = 0b0000_0100_0000;
        const CODEC_NEGOTIATION             = 0b0000_1000_0000;
        const HF_INDICATORS                 = 0b0001_0000_0000;
        const ESCO_S4_SETTINGS              = 0b0010_0000_0000;
        const ENHANCED_VOICE_RECOGNITION    = 0b0100_0000_0000;
        const VOICE_RECOGNITION_TEXT        = 0b1000_0000_0000;
    }
}

bitflags! {
    /// `+BRSF:` bitmap as advertised by the AG side.
    #[derive(Default)]
    pub struct AgFeatures: u32 {
        const THREE_WAY_CALLING             = 0b0000_0000_0001;
        const EC_NR                         = 0b0000_0000_0010;
        const VOICE_RECOGNITION             = 0b0000_0000_0100;
        const IN_BAND_RING_TONE             = 0b0000_0000_1000;
        const VOICE_TAG                     = 0b0000_0001_0000;
        const REJECT_CALL                   = 0b0000_0010_0000;
        const ENHANCED_CALL_STATUS          = 0b0000_0100_0000;
        const ENHANCED_CALL_CONTROL         = 0b0000_1000_0000;
        const EXTENDED_ERROR_RESULT_CODES   = 0b0001_0000_0000;
        const CODEC_NEGOTIATION             = 0b0010_0000_0000;
        const HF_INDICATORS                 = 0b0100_0000_0000;
        const ESCO_S4_SETTINGS              = 0b1000_0000_0000;
    }
}

impl HfFeatures {
    /// Both sides must advertise codec negotiation for `+BAC`/`+BCS` to apply.
    pub fn codec_negotiation(self, ag: AgFeatures) -> bool {
        self.contains(HfFeatures::CODEC_NEGOTIATION) && ag.contains(AgFeatures::CODEC_NEGOTIATION)
    }

    pub fn hf_indicators(self, ag: AgFeatures) -> bool {
        self.contains(HfFeatures::HF_INDICATORS) && ag.contains(AgFeatures::HF_INDICATORS)
    }
}

/// Voice codec identifier negotiated for the SCO/eSCO link.
///
/// `negotiated_codec` on a [`crate::session::Session`] starts at `Cvsd` and is
/// only ever raised, never lowered (see invariant in §3 of the design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CodecId {
    Cvsd = 0x01,
    Msbc = 0x02,
}

impl CodecId {
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            1 => Some(CodecId::Cvsd),
            2 => Some(CodecId::Msbc),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u16 {
        self as u16
    }
}

impl Default for CodecId {
    fn default() -> Self {
        CodecId::Cvsd
    }
}

/// Upper bounds on per-session arrays, mirroring the fixed-capacity arrays
/// the profile was originally specified against.
pub const MAX_AG_INDICATORS: usize = 20;
pub const MAX_REMOTE_CODECS: usize = 8;
pub const MAX_CALL_SERVICES: usize = 8;
pub const MAX_HF_INDICATORS: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_negotiation_requires_both_sides() {
        let hf = HfFeatures::CODEC_NEGOTIATION;
        assert!(!hf.codec_negotiation(AgFeatures::empty()));
        assert!(hf.codec_negotiation(AgFeatures::CODEC_NEGOTIATION));
    }

    #[test]
    fn codec_round_trips_through_wire_value() {
        assert_eq!(CodecId::from_wire(1), Some(CodecId::Cvsd));
        assert_eq!(CodecId::from_wire(2), Some(CodecId::Msbc));
        assert_eq!(CodecId::from_wire(9), None);
        assert_eq!(CodecId::Msbc.as_wire(), 2);
    }

    #[test]
    fn default_codec_is_cvsd() {
        assert_eq!(CodecId::default(), CodecId::Cvsd);
    }
}
