//! # Joystick Event-File Transport
//!
//! Reads kernel input events from `/dev/input/eventN`.
//!
//! ## Reading
//!
//! The file is opened non-blocking and optionally grabbed (`EVIOCGRAB`) so
//! the desktop does not see the controller twice. A grab failure is logged
//! and the device is read in shared mode. Every poll interval the task
//! drains the file until the read would block, reassembles 24-byte records
//! and applies them:
//!
//! | Record | Effect |
//! |--------|--------|
//! | `EV_ABS` | `axes[code] = value` (raw device range) |
//! | `EV_KEY` | `buttons[code] = 1` for any nonzero value, else `0` |
//! | `EV_SYN / SYN_REPORT` | raises the data signal |
//!
//! ## Keep-alive
//!
//! While started, the bank also raises the signal every `keepalive_ms` so a
//! stick held at a steady deflection keeps driving relative outputs.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::discovery;
use super::event::{RawEvent, EVENT_RECORD_SIZE};
use super::framing::RecordBuffer;
use super::{stop_task, Pending};
use crate::config::JoystickConfig;
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;
use crate::output::codes::{EventClass, SYN_REPORT};

/// `_IOW('E', 0x90, int)`
const EVIOCGRAB: u32 = 0x4004_4590;

/// Records read per drain call
const READ_BATCH: usize = 32;

/// Axis and button levels of one controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoystickState {
    /// `ABS_*` code to raw value
    pub axes: BTreeMap<u16, i32>,
    /// `BTN_*` code to 0/1
    pub buttons: BTreeMap<u16, u8>,
}

/// Turns raw chunks into joystick state updates
#[derive(Debug)]
pub struct EventDecoder {
    buffer: RecordBuffer,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self {
            buffer: RecordBuffer::new(EVENT_RECORD_SIZE),
        }
    }
}

impl EventDecoder {
    /// Applies every complete record in `chunk` to `state`.
    ///
    /// Returns the number of frame markers seen.
    pub fn feed(&mut self, chunk: &[u8], state: &mut JoystickState) -> usize {
        let mut syncs = 0;
        for record in self.buffer.push(chunk) {
            let Some(event) = RawEvent::decode(&record) else {
                continue;
            };
            match event.class() {
                Some(EventClass::Absolute) => {
                    state.axes.insert(event.code, event.value);
                }
                Some(EventClass::Key) => {
                    state.buttons.insert(event.code, u8::from(event.value != 0));
                }
                Some(EventClass::Sync) if event.code == SYN_REPORT => syncs += 1,
                _ => {}
            }
        }
        syncs
    }

    /// Bytes held back for the next chunk.
    #[must_use]
    pub fn leftover(&self) -> usize {
        self.buffer.leftover()
    }
}

/// Open event file, ungrabbed on drop
#[derive(Debug)]
struct EventFile {
    file: File,
    grabbed: bool,
}

fn set_grab(file: &File, grab: bool) -> io::Result<()> {
    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), EVIOCGRAB as _, libc::c_int::from(grab)) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl EventFile {
    fn open(path: &Path, grab: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;

        let mut grabbed = false;
        if grab {
            match set_grab(&file, true) {
                Ok(()) => {
                    info!("[joystick] Grabbed {} exclusively", path.display());
                    grabbed = true;
                }
                Err(e) => warn!(
                    "[joystick] EVIOCGRAB failed on {} ({}), reading in shared mode",
                    path.display(),
                    e
                ),
            }
        }

        Ok(Self { file, grabbed })
    }
}

impl Drop for EventFile {
    fn drop(&mut self) {
        if self.grabbed {
            if let Err(e) = set_grab(&self.file, false) {
                debug!("[joystick] Grab release failed: {}", e);
            }
        }
    }
}

fn spawn_poller(
    path: PathBuf,
    mut source: EventFile,
    interval: Duration,
    pending: Pending<JoystickState>,
    signal: DataSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut decoder = EventDecoder::default();
        let mut buf = [0u8; EVENT_RECORD_SIZE * READ_BATCH];

        loop {
            ticker.tick().await;

            let mut syncs = 0;
            loop {
                match source.file.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => syncs += decoder.feed(&buf[..n], &mut pending.lock()),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("[joystick] {}: {}", path.display(), e);
                        return;
                    }
                }
            }

            if syncs > 0 {
                signal.raise();
            }
        }
    })
}

/// One controller, `joystick[N]` in scripts
#[derive(Debug)]
pub struct JoystickDevice {
    index: u32,
    path: PathBuf,
    state: JoystickState,
    pending: Pending<JoystickState>,
    previous: HashMap<u16, u8>,
    task: Option<JoinHandle<()>>,
    attempted: bool,
}

impl JoystickDevice {
    fn new(index: u32, input_dir: &str) -> Self {
        Self {
            index,
            path: Path::new(input_dir).join(format!("event{}", index)),
            state: JoystickState::default(),
            pending: Pending::default(),
            previous: HashMap::new(),
            task: None,
            attempted: false,
        }
    }

    /// N in `eventN`.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Event file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Committed state.
    #[must_use]
    pub fn state(&self) -> &JoystickState {
        &self.state
    }

    /// Raw axis value, 0 until the device reports it.
    #[must_use]
    pub fn axis(&self, code: u16) -> i32 {
        self.state.axes.get(&code).copied().unwrap_or(0)
    }

    /// Button level.
    #[must_use]
    pub fn button(&self, code: u16) -> bool {
        self.state.buttons.get(&code).copied().unwrap_or(0) == 1
    }

    /// True only on a 0 to 1 transition since the previous call for `code`.
    ///
    /// The edge is consumed: a second call in the same tick returns false.
    pub fn get_pressed(&mut self, code: u16) -> bool {
        let now = self.state.buttons.get(&code).copied().unwrap_or(0);
        let before = self.previous.insert(code, now).unwrap_or(0);
        now == 1 && before == 0
    }

    /// Whether the event file is open and being polled.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Opens and starts polling. A failed open is logged once and leaves
    /// the device inert.
    fn open(&mut self, config: &JoystickConfig, signal: &DataSignal) {
        if self.attempted {
            return;
        }
        self.attempted = true;

        match EventFile::open(&self.path, config.grab) {
            Ok(source) => {
                info!("[joystick] Opened {}", self.path.display());
                self.task = Some(spawn_poller(
                    self.path.clone(),
                    source,
                    Duration::from_millis(config.poll_interval_ms),
                    self.pending.clone(),
                    signal.clone(),
                ));
            }
            Err(e) => warn!("[joystick] Cannot open {}: {}", self.path.display(), e),
        }
    }

    async fn close(&mut self) {
        stop_task(&mut self.task).await;
    }

    fn commit(&mut self) {
        self.state.clone_from(&self.pending.lock());
    }

    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: JoystickState) {
        *self.pending.lock() = state;
        self.commit();
    }
}

/// All controllers, indexed by event number
#[derive(Debug)]
pub struct JoystickBank {
    config: JoystickConfig,
    devices: BTreeMap<u32, JoystickDevice>,
    signal: Option<DataSignal>,
    keepalive: Option<JoinHandle<()>>,
}

impl JoystickBank {
    /// Creates an unstarted bank.
    #[must_use]
    pub fn new(config: &JoystickConfig) -> Self {
        Self {
            config: config.clone(),
            devices: BTreeMap::new(),
            signal: None,
            keepalive: None,
        }
    }

    /// Gets or creates `joystick[index]`. Once the bank is started a new
    /// device is opened immediately.
    pub fn device(&mut self, index: u32) -> &mut JoystickDevice {
        let config = &self.config;
        let device = self
            .devices
            .entry(index)
            .or_insert_with(|| JoystickDevice::new(index, &config.input_dir));
        if let Some(signal) = &self.signal {
            device.open(config, signal);
        }
        device
    }

    /// Existing device, without creating it.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&JoystickDevice> {
        self.devices.get(&index)
    }

    /// Finds a controller by name and returns its device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device matches.
    pub fn find(&mut self, keyword: Option<&str>) -> Result<&mut JoystickDevice> {
        let info = discovery::find(keyword)?;
        Ok(self.device(info.index))
    }

    /// Indices created so far.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.devices.keys().copied()
    }

    /// Whether any device is being polled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.devices.values().any(JoystickDevice::is_open)
    }
}

#[async_trait]
impl Plugin for JoystickBank {
    fn name(&self) -> &'static str {
        "joystick"
    }

    async fn start(&mut self, signal: DataSignal) -> Result<()> {
        for device in self.devices.values_mut() {
            device.open(&self.config, &signal);
        }

        if self.config.keepalive_ms > 0 {
            let period = Duration::from_millis(self.config.keepalive_ms);
            let ticker_signal = signal.clone();
            self.keepalive = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    ticker_signal.raise();
                }
            }));
        }

        self.signal = Some(signal);
        Ok(())
    }

    async fn stop(&mut self) {
        stop_task(&mut self.keepalive).await;
        for device in self.devices.values_mut() {
            device.close().await;
        }
        self.signal = None;
    }

    fn before_tick(&mut self) {
        for device in self.devices.values_mut() {
            device.commit();
        }
    }
}
