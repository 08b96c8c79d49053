//! Startup configuration.
//!
//! Loaded once from a TOML file and handed to the driver as immutable input.
//! A missing file is replaced by [`AppConfig::default`] written to disk first.

use crate::dispatch::{
    ActionDescriptor, ActionKind, ChannelConfig, EngineSettings, SendPolicy, SyntheticConfig,
};
use crate::input::gamepad::{self, GamepadSettings};
use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "thumbparams";
const CONFIG_FILE: &str = "config.toml";

/// Number of touch actions feeding thumb position and AB chords.
pub const TOUCH_ACTIONS: usize = 8;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct OscConfig {
    pub ip: String,
    /// Port the game client listens on.
    pub port: u16,
    /// Port we listen on for avatar change notifications.
    pub server_port: u16,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 9000,
            server_port: 9001,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// Dispatch loop rate in Hz.
    pub polling_rate: f64,
    /// Stick "moved" threshold in percent of full deflection.
    pub stick_move_tolerance: f32,
    pub binary_bits: u8,
    pub osc: OscConfig,
    #[serde(default)]
    pub gamepad: GamepadSettings,
    #[serde(default)]
    pub special: SyntheticConfig,
    /// Left A, B, trackpad, stick, then right A, B, trackpad, stick.
    #[serde(default)]
    pub touch: Vec<ActionDescriptor>,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    #[serde(default)]
    pub gamepad_actions: Vec<ActionDescriptor>,
}

fn vr_action(name: &str) -> String {
    format!("/actions/thumbparams/in/{}", name)
}

impl Default for AppConfig {
    fn default() -> Self {
        let touch = [
            ("lefta", "LeftAButton"),
            ("leftb", "LeftBButton"),
            ("lefttrackpad", "LeftTrackPad"),
            ("leftthumbstick", "LeftThumbStick"),
            ("righta", "RightAButton"),
            ("rightb", "RightBButton"),
            ("righttrackpad", "RightTrackPad"),
            ("rightthumbstick", "RightThumbStick"),
        ]
        .into_iter()
        .map(|(action, parameter)| {
            ActionDescriptor::boolean(vr_action(action), ChannelConfig::new(parameter).disabled())
        })
        .collect();

        let actions = vec![
            ActionDescriptor::scalar(
                vr_action("lefttrigger"),
                ChannelConfig::new("LeftTrigger").disabled(),
            ),
            ActionDescriptor::scalar(
                vr_action("righttrigger"),
                ChannelConfig::new("RightTrigger").disabled(),
            ),
            ActionDescriptor::vector2(
                vr_action("leftstick"),
                ChannelConfig::new("LeftStickX").disabled(),
                ChannelConfig::new("LeftStickY").disabled(),
                Some(ChannelConfig::new("LeftStickMoved").disabled()),
            ),
            ActionDescriptor::vector2(
                vr_action("rightstick"),
                ChannelConfig::new("RightStickX").disabled(),
                ChannelConfig::new("RightStickY").disabled(),
                Some(ChannelConfig::new("RightStickMoved").disabled()),
            ),
            ActionDescriptor::skeletal(
                vr_action("skeletonlefthand"),
                ChannelConfig::new("LeftHand").disabled(),
            ),
            ActionDescriptor::skeletal(
                vr_action("skeletonrighthand"),
                ChannelConfig::new("RightHand").disabled(),
            ),
        ];

        let gamepad_actions = vec![
            ActionDescriptor::boolean("A", ChannelConfig::new("XboxA").disabled()),
            ActionDescriptor::boolean("B", ChannelConfig::new("XboxB").disabled()),
            ActionDescriptor::scalar("LeftTrigger", ChannelConfig::new("XboxLeftTrigger").disabled()),
            ActionDescriptor::scalar(
                "RightTrigger",
                ChannelConfig::new("XboxRightTrigger").disabled(),
            ),
            ActionDescriptor::vector2(
                "LeftJoystickXY",
                ChannelConfig::new("XboxLeftStickX").disabled(),
                ChannelConfig::new("XboxLeftStickY").disabled(),
                None,
            ),
            ActionDescriptor::vector2(
                "DPadXY",
                ChannelConfig::new("XboxDPadX").disabled(),
                ChannelConfig::new("XboxDPadY").disabled(),
                None,
            ),
        ];

        Self {
            polling_rate: 40.0,
            stick_move_tolerance: 5.0,
            binary_bits: 4,
            osc: OscConfig::default(),
            gamepad: GamepadSettings::default(),
            special: SyntheticConfig::default(),
            touch,
            actions,
            gamepad_actions,
        }
    }
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Tick period for `rate` Hz, `None` when it rounds to zero or overflows.
fn tick_interval(rate: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / rate)
        .ok()
        .filter(|interval| !interval.is_zero())
}

fn config_home() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    })
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        config_home().join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Reads `path`, writing the default configuration there first if it does
    /// not exist yet.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?;

        if !exists {
            info!("Creating default configuration at {}", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;

        debug!(
            "Loaded config with {} touch, {} VR and {} gamepad actions",
            config.touch.len(),
            config.actions.len(),
            config.gamepad_actions.len()
        );
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.polling_rate.is_finite() && self.polling_rate > 0.0) {
            return Err(eyre!(
                "polling_rate must be a positive number of Hz, got {}",
                self.polling_rate
            ));
        }
        if tick_interval(self.polling_rate).is_none() {
            return Err(eyre!(
                "polling_rate of {} Hz is too high to schedule a tick",
                self.polling_rate
            ));
        }
        if !(0.0..=100.0).contains(&self.stick_move_tolerance) {
            return Err(eyre!(
                "stick_move_tolerance must be between 0 and 100 percent, got {}",
                self.stick_move_tolerance
            ));
        }
        if !(1..=crate::dispatch::binary::MAX_BITS).contains(&self.binary_bits) {
            return Err(eyre!(
                "binary_bits must be between 1 and {}, got {}",
                crate::dispatch::binary::MAX_BITS,
                self.binary_bits
            ));
        }
        if self.gamepad.polling_rate == 0 {
            return Err(eyre!("gamepad.polling_rate must be greater than 0"));
        }

        if !self.touch.is_empty() && self.touch.len() != TOUCH_ACTIONS {
            return Err(eyre!(
                "touch must list exactly {} actions or none, got {}",
                TOUCH_ACTIONS,
                self.touch.len()
            ));
        }
        if let Some(action) = self
            .touch
            .iter()
            .find(|a| !matches!(a.kind, ActionKind::Boolean { toggle: false, .. }))
        {
            return Err(eyre!(
                "touch action '{}' must be a plain boolean",
                action.name
            ));
        }

        for action in self.all_actions() {
            if let Some(channel) = action
                .kind
                .channels()
                .into_iter()
                .find(|c| !(c.hold >= 0.0 && Duration::try_from_secs_f64(c.hold).is_ok()))
            {
                return Err(eyre!(
                    "hold of '{}' must be zero or a representable number of seconds",
                    channel.parameter
                ));
            }
        }

        for action in &self.gamepad_actions {
            match gamepad::value_kind(&action.name) {
                Some(kind) if kind == action.kind.label() => {}
                Some(kind) => {
                    return Err(eyre!(
                        "gamepad action '{}' is a {} but is configured as {}",
                        action.name,
                        kind,
                        action.kind.label()
                    ))
                }
                None => return Err(eyre!("unknown gamepad action '{}'", action.name)),
            }
        }
        Ok(())
    }

    fn all_actions(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.touch
            .iter()
            .chain(&self.actions)
            .chain(&self.gamepad_actions)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            stick_tolerance: self.stick_move_tolerance / 100.0,
            binary_bits: self.binary_bits,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        tick_interval(self.polling_rate).unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Whether some gamepad action is enabled at all.
    pub fn gamepad_needed(&self) -> bool {
        self.gamepad.enabled
            && (self.gamepad_actions.iter().any(|a| a.kind.is_enabled())
                || self.special.controller_type.enabled)
    }

    /// Summary of every enabled channel's policy for the startup log.
    pub fn describe(&self) -> String {
        let count = |policy: SendPolicy| {
            self.all_actions()
                .flat_map(|a| a.kind.channels())
                .filter(|c| c.enabled && c.policy == policy)
                .count()
        };
        format!(
            "{} on change, {} send if truthy, {} always",
            count(SendPolicy::OnChange),
            count(SendPolicy::SendIfTruthy),
            count(SendPolicy::AlwaysSend)
        )
    }
}
