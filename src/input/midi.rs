//! # MIDI Transport
//!
//! Reads ALSA raw MIDI device files (`/dev/snd/midiC<card>D<device>`).
//! Port N is the Nth such file ordered by card, then device.
//!
//! Incoming messages are queued by the poll task. The pre-tick hook drains
//! the queue and the script sees the fields of the last message only.
//! System exclusive, timing and active sensing are filtered out.

use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{stop_task, Pending};
use crate::config::MidiConfig;
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;

/// Note off (high nibble of the status byte)
pub const STATUS_NOTE_OFF: u8 = 0x8;
/// Note on
pub const STATUS_NOTE_ON: u8 = 0x9;
/// Polyphonic aftertouch
pub const STATUS_POLY_AFTERTOUCH: u8 = 0xA;
/// Control change
pub const STATUS_CONTROL: u8 = 0xB;
/// Program change
pub const STATUS_PROGRAM_CHANGE: u8 = 0xC;
/// Channel aftertouch
pub const STATUS_CHANNEL_AFTERTOUCH: u8 = 0xD;
/// Pitch bend
pub const STATUS_PITCH_BEND: u8 = 0xE;

const POLL_INTERVAL: Duration = Duration::from_millis(4);

/// Messages kept between ticks; older ones are discarded first
const MAX_QUEUE: usize = 1024;

/// One channel message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MidiMessage {
    /// Message type, the high nibble of the status byte
    pub status: u8,
    /// Channel 0-15
    pub channel: u8,
    /// Data bytes, the second is 0 for one-byte messages
    pub data: [u8; 2],
}

impl MidiMessage {
    /// Note number of a note message.
    #[must_use]
    pub fn note(&self) -> u8 {
        self.data[0]
    }

    /// Velocity of a note message.
    #[must_use]
    pub fn velocity(&self) -> u8 {
        self.data[1]
    }

    /// Controller number of a control change.
    #[must_use]
    pub fn cc(&self) -> u8 {
        self.data[0]
    }

    /// Controller value of a control change.
    #[must_use]
    pub fn value(&self) -> u8 {
        self.data[1]
    }
}

fn data_len(status: u8) -> usize {
    match status >> 4 {
        STATUS_PROGRAM_CHANGE | STATUS_CHANNEL_AFTERTOUCH => 1,
        0x8..=0xE => 2,
        _ => 0,
    }
}

/// Byte-stream MIDI parser with running status
#[derive(Debug, Default)]
pub struct MidiParser {
    running: Option<u8>,
    data: [u8; 2],
    len: usize,
    in_sysex: bool,
}

impl MidiParser {
    /// Feeds one byte, returning a message when it completes one.
    pub fn push(&mut self, byte: u8) -> Option<MidiMessage> {
        match byte {
            // Realtime bytes may appear anywhere and carry nothing we use
            0xF8..=0xFF => None,
            0xF0 => {
                self.in_sysex = true;
                self.running = None;
                None
            }
            0xF7 => {
                self.in_sysex = false;
                None
            }
            // System common cancels running status; its data bytes are skipped
            0xF1..=0xF6 => {
                self.in_sysex = false;
                self.running = None;
                None
            }
            0x80..=0xEF => {
                self.in_sysex = false;
                self.running = Some(byte);
                self.len = 0;
                None
            }
            _ => {
                if self.in_sysex {
                    return None;
                }
                let status = self.running?;
                self.data[self.len] = byte;
                self.len += 1;
                if self.len < data_len(status) {
                    return None;
                }

                let message = MidiMessage {
                    status: status >> 4,
                    channel: status & 0x0F,
                    data: [self.data[0], if self.len == 2 { self.data[1] } else { 0 }],
                };
                self.len = 0;
                Some(message)
            }
        }
    }
}

fn card_device(name: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix("midiC")?;
    let (card, device) = rest.split_once('D')?;
    Some((card.parse().ok()?, device.parse().ok()?))
}

/// Lists raw MIDI device files in port order.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be read.
pub fn list_ports(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut ports: Vec<((u32, u32), PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let key = card_device(entry.file_name().to_str()?)?;
            Some((key, entry.path()))
        })
        .collect();
    ports.sort_by_key(|(key, _)| *key);
    Ok(ports.into_iter().map(|(_, path)| path).collect())
}

fn spawn_poller(
    path: PathBuf,
    mut file: File,
    queue: Pending<VecDeque<MidiMessage>>,
    signal: DataSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut parser = MidiParser::default();
        let mut buf = [0u8; 256];

        loop {
            ticker.tick().await;

            let mut received = 0;
            loop {
                match file.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut queue = queue.lock();
                        for message in buf[..n].iter().filter_map(|b| parser.push(*b)) {
                            if queue.len() == MAX_QUEUE {
                                queue.pop_front();
                            }
                            queue.push_back(message);
                            received += 1;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("[midi] {}: {}", path.display(), e);
                        return;
                    }
                }
            }

            if received > 0 {
                signal.raise();
            }
        }
    })
}

/// One MIDI input port, `midi[N]` in scripts
#[derive(Debug)]
pub struct MidiPort {
    index: usize,
    message: MidiMessage,
    fresh: bool,
    queue: Pending<VecDeque<MidiMessage>>,
    task: Option<JoinHandle<()>>,
    attempted: bool,
}

impl MidiPort {
    fn new(index: usize) -> Self {
        Self {
            index,
            message: MidiMessage::default(),
            fresh: false,
            queue: Pending::default(),
            task: None,
            attempted: false,
        }
    }

    /// Last message seen before this tick.
    #[must_use]
    pub fn message(&self) -> &MidiMessage {
        &self.message
    }

    /// Whether at least one message arrived since the previous tick.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    #[cfg(test)]
    pub(crate) fn deliver(&mut self, message: MidiMessage) {
        self.queue.lock().push_back(message);
        self.flush();
    }

    /// Whether the port is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn open(&mut self, dir: &Path, signal: &DataSignal) {
        if self.attempted {
            return;
        }
        self.attempted = true;

        let ports = match list_ports(dir) {
            Ok(ports) => ports,
            Err(e) => {
                warn!("[midi] Cannot list {}: {}", dir.display(), e);
                return;
            }
        };
        let Some(path) = ports.get(self.index) else {
            warn!(
                "[midi] Port {} not available ({} MIDI port(s) found)",
                self.index,
                ports.len()
            );
            return;
        };

        match OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(file) => {
                info!("[midi] Opened port {}: {}", self.index, path.display());
                self.task = Some(spawn_poller(
                    path.clone(),
                    file,
                    self.queue.clone(),
                    signal.clone(),
                ));
            }
            Err(e) => warn!("[midi] Cannot open {}: {}", path.display(), e),
        }
    }

    /// Drains the queue; the last message wins.
    pub(crate) fn flush(&mut self) {
        let mut queue = self.queue.lock();
        let drained = queue.len();
        self.fresh = drained > 0;
        if let Some(last) = queue.drain(..).last() {
            self.message = last;
        }
        if drained > 1 {
            debug!("[midi] Port {} coalesced {} messages", self.index, drained);
        }
    }
}

/// All MIDI ports
#[derive(Debug)]
pub struct MidiTransport {
    device_dir: PathBuf,
    ports: BTreeMap<usize, MidiPort>,
    signal: Option<DataSignal>,
}

impl MidiTransport {
    /// Creates an unstarted transport.
    #[must_use]
    pub fn new(config: &MidiConfig) -> Self {
        Self {
            device_dir: PathBuf::from(&config.device_dir),
            ports: BTreeMap::new(),
            signal: None,
        }
    }

    /// Gets or creates `midi[index]`, opening it once the transport runs.
    pub fn port(&mut self, index: usize) -> &mut MidiPort {
        let port = self.ports.entry(index).or_insert_with(|| MidiPort::new(index));
        if let Some(signal) = &self.signal {
            port.open(&self.device_dir, signal);
        }
        port
    }

    /// Existing port, without creating it.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MidiPort> {
        self.ports.get(&index)
    }

    /// Whether any port is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ports.values().any(MidiPort::is_open)
    }
}

#[async_trait]
impl Plugin for MidiTransport {
    fn name(&self) -> &'static str {
        "midi"
    }

    async fn start(&mut self, signal: DataSignal) -> Result<()> {
        for port in self.ports.values_mut() {
            port.open(&self.device_dir, &signal);
        }
        self.signal = Some(signal);
        Ok(())
    }

    async fn stop(&mut self) {
        for port in self.ports.values_mut() {
            stop_task(&mut port.task).await;
        }
        self.signal = None;
    }

    fn before_tick(&mut self) {
        for port in self.ports.values_mut() {
            port.flush();
        }
    }
}
