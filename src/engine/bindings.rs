//! # Binding Registry
//!
//! Every record a script can read or write, one field per transport or
//! output plugin, plus the filter bank. Multi-device transports
//! (joysticks, phones, MIDI ports) create their per-index records on first
//! access.
//!
//! Only the enabled plugins are started and receive tick hooks; the others
//! stay at their defaults.

use tracing::{info, warn};

use super::{DataSignal, Plugin};
use crate::config::Profile;
use crate::filters::FilterBank;
use crate::input::ahrs::AhrsTransport;
use crate::input::android::AndroidTransport;
use crate::input::evdev::JoystickBank;
use crate::input::freeimu::FreeImuTransport;
use crate::input::iphone::IphoneTransport;
use crate::input::midi::MidiTransport;
use crate::input::opentrack::OpentrackTransport;
use crate::input::ps3::Ps3Transport;
use crate::input::DROP_LOG_INTERVAL;
use crate::output::{MouseOutput, VjoyOutput};

/// Plugin identifiers, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Transport {
    Joystick,
    Android,
    Iphone,
    Opentrack,
    Ahrs,
    FreeImu,
    Midi,
    Ps3,
    Vjoy,
    Mouse,
}

impl Transport {
    /// Every plugin. Inputs come first so outputs are stopped last.
    pub const ALL: [Transport; 10] = [
        Transport::Joystick,
        Transport::Android,
        Transport::Iphone,
        Transport::Opentrack,
        Transport::Ahrs,
        Transport::FreeImu,
        Transport::Midi,
        Transport::Ps3,
        Transport::Vjoy,
        Transport::Mouse,
    ];

    /// Profile name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Transport::Joystick => "joystick",
            Transport::Android => "android",
            Transport::Iphone => "iphone",
            Transport::Opentrack => "opentrack",
            Transport::Ahrs => "ahrs",
            Transport::FreeImu => "freeimu",
            Transport::Midi => "midi",
            Transport::Ps3 => "ps3",
            Transport::Vjoy => "vjoy",
            Transport::Mouse => "mouse",
        }
    }

    /// Parses a profile name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// Script-visible records
#[derive(Debug)]
pub struct Bindings {
    /// `joystick[N]`
    pub joystick: JoystickBank,
    /// `android[N]`
    pub android: AndroidTransport,
    pub iphone: IphoneTransport,
    pub opentrack: OpentrackTransport,
    pub ahrs: AhrsTransport,
    pub freeimu: FreeImuTransport,
    /// `midi[N]`
    pub midi: MidiTransport,
    pub ps3: Ps3Transport,
    /// Virtual joystick axes, buttons and keyboard
    pub vjoy: VjoyOutput,
    pub mouse: MouseOutput,
    pub filters: FilterBank,
    enabled: Vec<Transport>,
    started: Vec<Transport>,
    hook_errors: u64,
}

impl Bindings {
    /// Builds every record from a profile. Only `enabled` plugins will be
    /// started; duplicates are ignored and registration order is fixed.
    #[must_use]
    pub fn from_profile(profile: &Profile, enabled: &[Transport]) -> Self {
        let host = profile.network.bind_host.as_str();
        Self {
            joystick: JoystickBank::new(&profile.joystick),
            android: AndroidTransport::new(host, &profile.android),
            iphone: IphoneTransport::new(host, &profile.iphone),
            opentrack: OpentrackTransport::new(host, &profile.opentrack),
            ahrs: AhrsTransport::new(&profile.ahrs),
            freeimu: FreeImuTransport::new(&profile.freeimu),
            midi: MidiTransport::new(&profile.midi),
            ps3: Ps3Transport::new(),
            vjoy: VjoyOutput::new(),
            mouse: MouseOutput::new(),
            filters: FilterBank::new(),
            enabled: Transport::ALL
                .into_iter()
                .filter(|t| enabled.contains(t))
                .collect(),
            started: Vec::new(),
            hook_errors: 0,
        }
    }

    fn plugin_mut(&mut self, transport: Transport) -> &mut dyn Plugin {
        match transport {
            Transport::Joystick => &mut self.joystick,
            Transport::Android => &mut self.android,
            Transport::Iphone => &mut self.iphone,
            Transport::Opentrack => &mut self.opentrack,
            Transport::Ahrs => &mut self.ahrs,
            Transport::FreeImu => &mut self.freeimu,
            Transport::Midi => &mut self.midi,
            Transport::Ps3 => &mut self.ps3,
            Transport::Vjoy => &mut self.vjoy,
            Transport::Mouse => &mut self.mouse,
        }
    }

    /// Enabled plugins in registration order.
    #[must_use]
    pub fn enabled(&self) -> &[Transport] {
        &self.enabled
    }

    /// Whether `transport` was enabled by the profile.
    #[must_use]
    pub fn is_enabled(&self, transport: Transport) -> bool {
        self.enabled.contains(&transport)
    }

    /// Whether `transport` started and holds a live handle.
    #[must_use]
    pub fn is_active(&self, transport: Transport) -> bool {
        if !self.started.contains(&transport) {
            return false;
        }
        match transport {
            Transport::Joystick => true,
            Transport::Android => self.android.is_active(),
            Transport::Iphone => self.iphone.is_active(),
            Transport::Opentrack => self.opentrack.is_active(),
            Transport::Ahrs => self.ahrs.is_active(),
            Transport::FreeImu => self.freeimu.is_active(),
            Transport::Midi => true,
            Transport::Ps3 => self.ps3.is_active(),
            Transport::Vjoy => self.vjoy.is_active(),
            Transport::Mouse => self.mouse.is_active(),
        }
    }

    /// Starts every enabled plugin. A failure is logged and leaves that
    /// plugin inert; the others are unaffected.
    ///
    /// Returns the number of plugins that started.
    pub async fn start_all(&mut self, signal: &DataSignal) -> usize {
        for transport in self.enabled.clone() {
            if self.started.contains(&transport) {
                continue;
            }
            match self.plugin_mut(transport).start(signal.clone()).await {
                Ok(()) => {
                    info!("[{}] Started", transport.name());
                    self.started.push(transport);
                }
                Err(e) => warn!("[{}] Not available, continuing without it: {}", transport.name(), e),
            }
        }
        self.started.len()
    }

    /// Stops every enabled plugin in registration order, started or not.
    pub async fn stop_all(&mut self) {
        for transport in self.enabled.clone() {
            self.plugin_mut(transport).stop().await;
            info!("[{}] Stopped", transport.name());
        }
        self.started.clear();
    }

    /// Pre-tick hook of every started plugin.
    pub fn before_tick(&mut self) {
        for i in 0..self.started.len() {
            let transport = self.started[i];
            self.plugin_mut(transport).before_tick();
        }
    }

    /// Post-tick hook of every started plugin. Errors are logged, the first
    /// and every thousandth at WARN.
    pub fn after_tick(&mut self) {
        for i in 0..self.started.len() {
            let transport = self.started[i];
            if let Err(e) = self.plugin_mut(transport).after_tick() {
                self.hook_errors += 1;
                if self.hook_errors == 1 || self.hook_errors % DROP_LOG_INTERVAL == 0 {
                    warn!(
                        "[{}] Output write failed: {} ({} so far)",
                        transport.name(),
                        e,
                        self.hook_errors
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(extra: &str) -> Profile {
        Profile::from_toml(&format!("script = \"debug\"\n{}", extra)).unwrap()
    }

    #[test]
    fn test_transport_names_round_trip() {
        for transport in Transport::ALL {
            assert_eq!(Transport::from_name(transport.name()), Some(transport));
            assert!(crate::config::TRANSPORT_NAMES.contains(&transport.name()));
        }
        assert_eq!(Transport::from_name("hid"), None);
    }

    #[test]
    fn test_enabled_in_registration_order() {
        let bindings = Bindings::from_profile(
            &profile(""),
            &[Transport::Mouse, Transport::Joystick, Transport::Mouse],
        );
        assert_eq!(bindings.enabled(), &[Transport::Joystick, Transport::Mouse]);
        assert!(bindings.is_enabled(Transport::Joystick));
        assert!(!bindings.is_enabled(Transport::Ps3));
        assert!(!bindings.is_active(Transport::Joystick));
    }

    #[tokio::test]
    async fn test_failed_start_leaves_plugin_inert() {
        let mut bindings = Bindings::from_profile(
            &profile("[ahrs]\nport = \"/dev/nonexistent_ahrs\"\n"),
            &[Transport::Ahrs, Transport::Ps3],
        );
        let signal = DataSignal::new();

        assert_eq!(bindings.start_all(&signal).await, 1);
        assert!(!bindings.is_active(Transport::Ahrs));
        assert!(bindings.is_active(Transport::Ps3));

        bindings.ps3.feed().push([("cross".to_string(), 1.0)].into_iter().collect());
        bindings.before_tick();
        assert!(bindings.ps3.pressed("cross"));
        bindings.after_tick();

        bindings.stop_all().await;
        assert!(!bindings.is_active(Transport::Ps3));
        bindings.stop_all().await;
    }

    #[test]
    fn test_disabled_plugins_get_no_hooks() {
        let mut bindings = Bindings::from_profile(&profile(""), &[]);
        bindings.ps3.feed().push([("cross".to_string(), 1.0)].into_iter().collect());
        bindings.before_tick();
        assert!(!bindings.ps3.pressed("cross"));
    }
}
