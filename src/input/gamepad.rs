//! Gamepad backend built on gilrs.
//!
//! A collector thread owns the gilrs context, drains its events at the configured
//! polling rate and publishes immutable [`GamepadSnapshot`]s through a watch
//! channel. The dispatch loop only ever reads the latest snapshot, so it never
//! waits on the collector.
//!
//! ```text
//! gilrs ──► GamepadCollector<Collecting> ──watch──► GamepadSource::poll()
//! ```
//!
//! While no gilrs context can be created the thread retries once per second.

use super::{ActionSource, InputError, Value};
use crate::dispatch::ActionDescriptor;
use chrono::{DateTime, Local};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

const BUTTON_COUNT: usize = 14;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct GamepadSettings {
    pub enabled: bool,
    /// Collector polling rate in Hz.
    pub polling_rate: u32,
    /// Radial deadzone applied to the composite stick vectors.
    pub deadzone: f32,
}

impl Default for GamepadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_rate: 1000,
            deadzone: 0.2,
        }
    }
}

impl GamepadSettings {
    fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.polling_rate.max(1)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamepadButton {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    LeftThumb,
    RightThumb,
    Back,
    Start,
    LeftDPad,
    RightDPad,
    UpDPad,
    DownDPad,
}

impl GamepadButton {
    pub const ALL: [GamepadButton; BUTTON_COUNT] = [
        GamepadButton::A,
        GamepadButton::B,
        GamepadButton::X,
        GamepadButton::Y,
        GamepadButton::LeftBumper,
        GamepadButton::RightBumper,
        GamepadButton::LeftThumb,
        GamepadButton::RightThumb,
        GamepadButton::Back,
        GamepadButton::Start,
        GamepadButton::LeftDPad,
        GamepadButton::RightDPad,
        GamepadButton::UpDPad,
        GamepadButton::DownDPad,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GamepadButton::A => "A",
            GamepadButton::B => "B",
            GamepadButton::X => "X",
            GamepadButton::Y => "Y",
            GamepadButton::LeftBumper => "LeftBumper",
            GamepadButton::RightBumper => "RightBumper",
            GamepadButton::LeftThumb => "LeftThumb",
            GamepadButton::RightThumb => "RightThumb",
            GamepadButton::Back => "Back",
            GamepadButton::Start => "Start",
            GamepadButton::LeftDPad => "LeftDPad",
            GamepadButton::RightDPad => "RightDPad",
            GamepadButton::UpDPad => "UpDPad",
            GamepadButton::DownDPad => "DownDPad",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }

    fn from_gilrs(button: Button) -> Option<Self> {
        match button {
            Button::South => Some(GamepadButton::A),
            Button::East => Some(GamepadButton::B),
            Button::West => Some(GamepadButton::X),
            Button::North => Some(GamepadButton::Y),
            Button::LeftTrigger => Some(GamepadButton::LeftBumper),
            Button::RightTrigger => Some(GamepadButton::RightBumper),
            Button::LeftThumb => Some(GamepadButton::LeftThumb),
            Button::RightThumb => Some(GamepadButton::RightThumb),
            Button::Select => Some(GamepadButton::Back),
            Button::Start => Some(GamepadButton::Start),
            Button::DPadLeft => Some(GamepadButton::LeftDPad),
            Button::DPadRight => Some(GamepadButton::RightDPad),
            Button::DPadUp => Some(GamepadButton::UpDPad),
            Button::DPadDown => Some(GamepadButton::DownDPad),
            _ => None,
        }
    }
}

/// Kind label of the value `name` resolves to, for config validation.
pub fn value_kind(name: &str) -> Option<&'static str> {
    GamepadSnapshot::default()
        .value(name, 0.0)
        .map(|value| value.label())
}

/// Immutable copy of the gamepad state at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    pub plugged: bool,
    pub left_stick: (f32, f32),
    pub right_stick: (f32, f32),
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub buttons: [bool; BUTTON_COUNT],
    pub updated_at: Option<DateTime<Local>>,
}

impl GamepadSnapshot {
    pub fn button(&self, button: GamepadButton) -> bool {
        self.buttons[button.index()]
    }

    /// Resolves an action name against this snapshot.
    pub fn value(&self, name: &str, deadzone: f32) -> Option<Value> {
        let value = match name {
            "LeftJoystickX" => Value::Scalar(self.left_stick.0),
            "LeftJoystickY" => Value::Scalar(self.left_stick.1),
            "RightJoystickX" => Value::Scalar(self.right_stick.0),
            "RightJoystickY" => Value::Scalar(self.right_stick.1),
            "LeftTrigger" => Value::Scalar(self.left_trigger),
            "RightTrigger" => Value::Scalar(self.right_trigger),
            "LeftJoystickXY" => {
                let (x, y) = dz_scaled_radial(self.left_stick.0, self.left_stick.1, deadzone);
                Value::Vector2(x, y)
            }
            "RightJoystickXY" => {
                let (x, y) = dz_scaled_radial(self.right_stick.0, self.right_stick.1, deadzone);
                Value::Vector2(x, y)
            }
            "DPadXY" => {
                let axis = |neg: GamepadButton, pos: GamepadButton| {
                    f32::from(u8::from(self.button(pos))) - f32::from(u8::from(self.button(neg)))
                };
                Value::Vector2(
                    axis(GamepadButton::LeftDPad, GamepadButton::RightDPad),
                    axis(GamepadButton::DownDPad, GamepadButton::UpDPad),
                )
            }
            other => Value::Boolean(self.button(GamepadButton::from_name(other)?)),
        };
        Some(value)
    }
}

/// Scales a stick vector radially so the deadzone edge maps to zero.
pub fn dz_scaled_radial(x: f32, y: f32, deadzone: f32) -> (f32, f32) {
    let magnitude = (x * x + y * y).sqrt();
    if magnitude < deadzone || magnitude == 0.0 || deadzone >= 1.0 {
        return (0.0, 0.0);
    }
    let scaled = (magnitude - deadzone) / (1.0 - deadzone);
    (x / magnitude * scaled, y / magnitude * scaled)
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectorState {
    Selecting,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct GamepadCollector<S: CollectorState> {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
    settings: GamepadSettings,
    snapshot: GamepadSnapshot,
    publisher: watch::Sender<GamepadSnapshot>,
}

impl GamepadCollector<Selecting> {
    pub fn create(
        gilrs: Gilrs,
        settings: GamepadSettings,
        publisher: watch::Sender<GamepadSnapshot>,
    ) -> Self {
        debug!("Creating gamepad collector with settings: {:?}", settings);
        Self::new(gilrs, None, settings, GamepadSnapshot::default(), publisher)
    }

    /// Picks the first connected gamepad and starts collecting.
    pub fn select(mut self) -> GamepadCollector<Collecting> {
        let connected: Vec<(GamepadId, String)> = self
            .gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        match connected.first() {
            Some((id, name)) => {
                info!("Using gamepad {} ({}) of {} connected", name, id, connected.len());
                self.active_gamepad = Some(*id);
                self.snapshot.plugged = true;
                self.snapshot.updated_at = Some(Local::now());
                self.publisher.send_replace(self.snapshot.clone());
            }
            None => info!("No gamepad connected, waiting for one"),
        }

        self.transition()
    }
}

impl GamepadCollector<Collecting> {
    pub fn run(mut self, shutdown: &CancellationToken) {
        let interval = self.settings.poll_interval();
        info!("Gamepad collector running every {:?}", interval);

        while !shutdown.is_cancelled() {
            self.collect_pending();
            std::thread::sleep(interval);
        }
        info!("Gamepad collector stopped");
    }

    /// Drains all queued gilrs events and publishes the result once.
    pub fn collect_pending(&mut self) {
        let mut changed = false;
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            changed |= self.apply(id, event);
        }

        if changed {
            self.snapshot.updated_at = Some(Local::now());
            self.publisher.send_replace(self.snapshot.clone());
        }
    }

    fn apply(&mut self, id: GamepadId, event: EventType) -> bool {
        match event {
            EventType::Connected => {
                if self.active_gamepad.is_none() {
                    info!("Gamepad {} connected", id);
                    self.active_gamepad = Some(id);
                    self.snapshot.plugged = true;
                    return true;
                }
                false
            }
            EventType::Disconnected if self.active_gamepad == Some(id) => {
                warn!("Gamepad {} disconnected", id);
                let next = self
                    .gilrs
                    .gamepads()
                    .find(|(other, gamepad)| *other != id && gamepad.is_connected())
                    .map(|(other, _)| other);
                self.active_gamepad = next;
                self.snapshot = GamepadSnapshot {
                    plugged: next.is_some(),
                    ..GamepadSnapshot::default()
                };
                true
            }
            _ if self.active_gamepad != Some(id) => false,
            EventType::AxisChanged(axis, value, _) => self.apply_axis(axis, value),
            EventType::ButtonChanged(Button::LeftTrigger2, value, _) => {
                self.snapshot.left_trigger = value;
                true
            }
            EventType::ButtonChanged(Button::RightTrigger2, value, _) => {
                self.snapshot.right_trigger = value;
                true
            }
            EventType::ButtonPressed(button, _) => self.apply_button(button, true),
            EventType::ButtonReleased(button, _) => self.apply_button(button, false),
            _ => false,
        }
    }

    fn apply_axis(&mut self, axis: Axis, value: f32) -> bool {
        match axis {
            Axis::LeftStickX => self.snapshot.left_stick.0 = value,
            Axis::LeftStickY => self.snapshot.left_stick.1 = value,
            Axis::RightStickX => self.snapshot.right_stick.0 = value,
            Axis::RightStickY => self.snapshot.right_stick.1 = value,
            Axis::LeftZ => self.snapshot.left_trigger = value,
            Axis::RightZ => self.snapshot.right_trigger = value,
            _ => {
                debug!("Ignoring unsupported axis: {:?}", axis);
                return false;
            }
        }
        true
    }

    fn apply_button(&mut self, button: Button, pressed: bool) -> bool {
        let Some(mapped) = GamepadButton::from_gilrs(button) else {
            debug!("Button not mapped: {:?}", button);
            return false;
        };
        debug!(
            "Button {} {} at {}",
            mapped.name(),
            if pressed { "pressed" } else { "released" },
            Local::now().format("%H:%M:%S.%3f")
        );
        self.snapshot.buttons[mapped.index()] = pressed;
        true
    }
}

/// Dispatch-side handle reading the collector's latest snapshot.
pub struct GamepadSource {
    snapshots: watch::Receiver<GamepadSnapshot>,
    current: GamepadSnapshot,
    deadzone: f32,
}

impl GamepadSource {
    /// Starts the collector thread.
    pub fn spawn(
        settings: GamepadSettings,
        shutdown: CancellationToken,
    ) -> Result<Self, InputError> {
        let (publisher, snapshots) = watch::channel(GamepadSnapshot::default());
        let deadzone = settings.deadzone;

        std::thread::Builder::new()
            .name("gamepad-collector".to_string())
            .spawn(move || collector_thread(settings, publisher, shutdown))
            .map_err(|e| InputError::Backend(format!("failed to spawn collector: {}", e)))?;

        Ok(Self::from_receiver(snapshots, deadzone))
    }

    pub fn from_receiver(snapshots: watch::Receiver<GamepadSnapshot>, deadzone: f32) -> Self {
        Self {
            snapshots,
            current: GamepadSnapshot::default(),
            deadzone,
        }
    }
}

fn collector_thread(
    settings: GamepadSettings,
    publisher: watch::Sender<GamepadSnapshot>,
    shutdown: CancellationToken,
) {
    let mut warned = false;
    let gilrs = loop {
        if shutdown.is_cancelled() {
            return;
        }
        match Gilrs::new() {
            Ok(gilrs) => break gilrs,
            Err(e) if !warned => {
                warn!("Gamepad backend unavailable, retrying: {}", e);
                warned = true;
            }
            Err(e) => debug!("Gamepad backend still unavailable: {}", e),
        }
        std::thread::sleep(RETRY_INTERVAL);
    };

    GamepadCollector::create(gilrs, settings, publisher)
        .select()
        .run(&shutdown);
}

impl ActionSource for GamepadSource {
    fn name(&self) -> &str {
        "gamepad"
    }

    fn poll(&mut self) -> Result<(), InputError> {
        self.current = self.snapshots.borrow_and_update().clone();
        Ok(())
    }

    fn read(&self, action: &ActionDescriptor) -> Result<Value, InputError> {
        self.current
            .value(&action.name, self.deadzone)
            .ok_or_else(|| InputError::UnknownAction(action.name.clone()))
    }

    fn is_connected(&self) -> bool {
        self.current.plugged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ActionDescriptor, ChannelConfig};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn radial_deadzone_zeroes_small_deflection() {
        assert_eq!(dz_scaled_radial(0.1, 0.1, 0.2), (0.0, 0.0));
    }

    #[test]
    fn radial_deadzone_rescales_magnitude() {
        let (x, y) = dz_scaled_radial(0.6, 0.0, 0.2);
        assert!(approx(x, 0.5), "x = {}", x);
        assert!(approx(y, 0.0));

        let (x, y) = dz_scaled_radial(0.0, -1.0, 0.2);
        assert!(approx(x, 0.0));
        assert!(approx(y, -1.0));
    }

    #[test]
    fn resolves_snapshot_values_by_name() {
        let mut snapshot = GamepadSnapshot {
            plugged: true,
            left_trigger: 0.75,
            ..GamepadSnapshot::default()
        };
        snapshot.buttons[GamepadButton::A.index()] = true;
        snapshot.buttons[GamepadButton::UpDPad.index()] = true;
        snapshot.buttons[GamepadButton::LeftDPad.index()] = true;

        assert_eq!(snapshot.value("A", 0.2), Some(Value::Boolean(true)));
        assert_eq!(snapshot.value("B", 0.2), Some(Value::Boolean(false)));
        assert_eq!(snapshot.value("LeftTrigger", 0.2), Some(Value::Scalar(0.75)));
        assert_eq!(snapshot.value("DPadXY", 0.2), Some(Value::Vector2(-1.0, 1.0)));
        assert_eq!(snapshot.value("Turbo", 0.2), None);
    }

    #[test]
    fn value_kinds_for_validation() {
        assert_eq!(value_kind("LeftJoystickXY"), Some("vector2"));
        assert_eq!(value_kind("RightTrigger"), Some("scalar"));
        assert_eq!(value_kind("Start"), Some("boolean"));
        assert_eq!(value_kind("Nope"), None);
    }

    #[test]
    fn source_reads_latest_published_snapshot() {
        let (publisher, receiver) = watch::channel(GamepadSnapshot::default());
        let mut source = GamepadSource::from_receiver(receiver, 0.2);
        let action = ActionDescriptor::boolean("Start", ChannelConfig::new("XboxStart"));

        source.poll().unwrap();
        assert!(!source.is_connected());
        assert_eq!(source.read(&action).unwrap(), Value::Boolean(false));

        let mut snapshot = GamepadSnapshot {
            plugged: true,
            ..GamepadSnapshot::default()
        };
        snapshot.buttons[GamepadButton::Start.index()] = true;
        publisher.send_replace(snapshot);

        // not visible until the next poll
        assert_eq!(source.read(&action).unwrap(), Value::Boolean(false));
        source.poll().unwrap();
        assert!(source.is_connected());
        assert_eq!(source.read(&action).unwrap(), Value::Boolean(true));
    }
}
