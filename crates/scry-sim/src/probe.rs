//! Overlay stand-in: connects to a running feed, configures it and reports
//! what arrives.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use scry_net::{ConnectionState, FeedClient};
use scry_protocol::{BlockRecord, ClientMessage, EntityRecord, ServerMessage};
use tracing::{info, warn};

use crate::world::ore_labels;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Running counts of received traffic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tally {
    pub frames: u64,
    pub full_records: u64,
    pub position_records: u64,
    pub block_adds: u64,
    pub block_removes: u64,
    pub deletes: u64,
    pub clears: u64,
    pub unloads: u64,
    pub hotkeys: u64,
}

impl Tally {
    /// Count one message.
    pub fn record(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::EntityFrame(frame) => {
                self.frames += 1;
                for record in &frame.records {
                    match record {
                        EntityRecord::Position { .. } => self.position_records += 1,
                        _ => self.full_records += 1,
                    }
                }
            }
            ServerMessage::BlockDiff(diff) => {
                for record in &diff.records {
                    match record {
                        BlockRecord::Add { .. } => self.block_adds += 1,
                        BlockRecord::Remove { .. } => self.block_removes += 1,
                    }
                }
            }
            ServerMessage::DeleteType { .. } => self.deletes += 1,
            ServerMessage::ClearAll => self.clears += 1,
            ServerMessage::ChunkUnload { .. } => self.unloads += 1,
            ServerMessage::HotkeyPressed { .. } => self.hotkeys += 1,
        }
    }
}

/// The commands a freshly connected overlay sends.
pub fn handshake() -> Vec<ClientMessage> {
    vec![
        ClientMessage::ModuleStates(vec![
            ("ESP".into(), true),
            ("PlayerESP".into(), true),
            ("Nametags".into(), true),
        ]),
        ClientMessage::EntityFilter {
            generic: true,
            all: false,
            names: vec!["Witch".into(), "Creeper".into()],
        },
        ClientMessage::Hotkeys(vec![82, 71]),
        ClientMessage::WatchList(ore_labels()),
    ]
}

/// Connect to `addr`, send the handshake and log traffic until `duration`
/// elapses or the feed closes.
pub async fn run(addr: SocketAddr, duration: Option<Duration>) -> std::io::Result<Tally> {
    let mut client = FeedClient::connect(addr).await?;
    info!("Probe connected to {addr}");
    for message in handshake() {
        client.send(&message).await?;
    }

    let started = Instant::now();
    let mut tally = Tally::default();
    let mut last_report = Instant::now();
    loop {
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        match client.recv_timeout(REPORT_INTERVAL).await {
            Some(message) => {
                if !matches!(message, ServerMessage::EntityFrame(_)) {
                    tracing::debug!("Received {message:?}");
                }
                tally.record(&message);
            }
            None if client.state().current() == ConnectionState::Disconnected => {
                warn!("Feed closed the connection");
                break;
            }
            None => {}
        }
        if last_report.elapsed() >= REPORT_INTERVAL {
            info!("Probe: {tally:?}");
            last_report = Instant::now();
        }
    }
    client.disconnect();
    Ok(tally)
}
