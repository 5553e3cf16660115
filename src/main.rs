mod address;
mod config;
mod error;
mod event;
mod features;
mod lifecycle;
mod parser;
mod registry;
mod sdp;
mod session;
mod transport;

use std::io::{self, BufRead, Write};

use clap::Parser as _;
use serde::Serialize;
use tracing::info;

use address::DeviceAddress;
use config::{Config, Side};
use event::{Event, EventSink};
use session::Session;

/// A serializable view of the fields a client of this demo would actually
/// want to read back; kept separate from [`Session`] so the core stays free
/// of a `serde` dependency on its own types.
#[derive(Serialize)]
struct SessionSnapshot {
    remote_addr: String,
    remote_supported_features: u32,
    negotiated_codec: u16,
    ag_indicator_count: usize,
    network_operator_name: String,
    events_emitted: usize,
}

impl SessionSnapshot {
    fn capture(session: &Session, events: &[Event]) -> Self {
        SessionSnapshot {
            remote_addr: session.remote_addr.to_string(),
            remote_supported_features: session.remote_supported_features,
            negotiated_codec: session.negotiated_codec.as_wire(),
            ag_indicator_count: session.ag_indicators.len(),
            network_operator_name: session.network_operator.name.clone(),
            events_emitted: events.len(),
        }
    }
}

fn init_tracing(format: &config::LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr));
    match format {
        config::LogFormat::Compact => builder.compact().init(),
        config::LogFormat::Json => builder.json().init(),
    }
}

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config.log_format);

    info!(
        side = ?config.side,
        line_buffer_capacity = config.line_buffer_capacity,
        service_name = %config.service_name,
        "🔵 hfp-core demo starting"
    );

    let addr = DeviceAddress::new([0x00, 0x1a, 0x7d, 0xda, 0x71, 0x13]);
    let mut session = Session::new(addr).with_line_capacity(config.line_buffer_capacity);
    session.is_hands_free_side = matches!(config.side, Side::Hf);

    let record = sdp::build_service_record(0x111f, 1, &config.service_name, 0x001f);
    info!(bytes = record.len(), "📄 SDP service record built");

    let mut events: Vec<Event> = Vec::new();

    let stdin = io::stdin();
    info!("type AT lines below (Ctrl-D to finish and print the session snapshot)");
    for line in stdin.lock().lines() {
        let mut with_terminator = line?;
        with_terminator.push_str("\r\n");
        parser::feed_bytes(&mut session, with_terminator.as_bytes());
        print_command_result(&session);
    }

    if session.parser_state == session::ParserState::Header
        && session.command == session::Command::Ok
        && session.state == lifecycle::ConnectionState::Idle
    {
        events.emit(Event::Complete { addr });
    }

    print_session_snapshot(&session, &events);
    Ok(())
}

fn print_command_result(session: &Session) {
    println!("  -> command: {:?}, parser_state: {:?}", session.command, session.parser_state);
}

fn print_session_snapshot(session: &Session, events: &[Event]) {
    let mut out = io::stdout();
    let snapshot = SessionSnapshot::capture(session, events);
    let json = serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".into());
    let _ = writeln!(out, "\n=== session snapshot ===\n{json}");
    let _ = writeln!(out, "ag_indicators: {:?}", session.ag_indicators);
    let _ = writeln!(out, "network_operator: {:?}", session.network_operator);
    for event in events {
        let wire = event.to_wire();
        let _ = writeln!(out, "  {:?} ({} wire bytes)", event, wire.len());
    }
}
