use clap::{Parser, ValueEnum};

/// Which side of the handsfree link this demo session plays.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Hands-Free unit (phone headset, car kit).
    Hf,
    /// Audio Gateway (the phone).
    Ag,
}

/// Log line format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Bluetooth Hands-Free Profile AT-command core: session/parser demo.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Which side of the SLC this session represents
    #[arg(long, value_enum, default_value_t = Side::Ag)]
    pub side: Side,

    /// Per-session AT line buffer capacity in bytes
    #[arg(long, default_value_t = 128)]
    pub line_buffer_capacity: usize,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Service name advertised in the SDP record
    #[arg(long, env = "HFP_SERVICE_NAME", default_value = "Handsfree")]
    pub service_name: String,
}
