//! Static per-action configuration.
//!
//! An [`ActionDescriptor`] names the backend action to query and describes, per
//! output channel, whether and how its value is published. Descriptors are loaded
//! once at startup and never change while the engine runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// When a freshly sampled value is transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    /// Only when the value differs from the last transmitted one.
    #[default]
    OnChange,
    /// Every cycle in which the value is truthy (true / non-zero).
    SendIfTruthy,
    /// Every cycle.
    AlwaysSend,
}

impl SendPolicy {
    pub fn is_always(self) -> bool {
        self == SendPolicy::AlwaysSend
    }

    /// Short tag used in the debug table.
    pub fn tag(self) -> &'static str {
        match self {
            SendPolicy::OnChange => "SOC",
            SendPolicy::SendIfTruthy => "SOP",
            SendPolicy::AlwaysSend => "",
        }
    }
}

/// Publishing rules for one output parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Parameter name, without the namespace root.
    pub parameter: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub policy: SendPolicy,

    /// Seconds a release/decrease is held back. 0 disables.
    #[serde(default)]
    pub hold: f64,

    /// Transmit as sign + magnitude bits instead of one float.
    #[serde(default)]
    pub binary: bool,

    /// Remap [-1, 1] to [0, 1] before anything else. Vector axes only.
    #[serde(default)]
    pub unsigned: bool,
}

fn default_enabled() -> bool {
    true
}

impl ChannelConfig {
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            enabled: true,
            policy: SendPolicy::OnChange,
            hold: 0.0,
            binary: false,
            unsigned: false,
        }
    }

    pub fn with_policy(mut self, policy: SendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_hold(mut self, seconds: f64) -> Self {
        self.hold = seconds;
        self
    }

    pub fn with_binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    pub fn with_unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = unsigned;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn hold_duration(&self) -> Option<Duration> {
        if self.hold > 0.0 {
            Duration::try_from_secs_f64(self.hold).ok()
        } else {
            None
        }
    }
}

/// Shape of an action and its output channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Boolean {
        output: ChannelConfig,
        /// Treat the source as a momentary trigger flipping a persisted state.
        #[serde(default)]
        toggle: bool,
    },
    Scalar {
        output: ChannelConfig,
    },
    Vector2 {
        x: ChannelConfig,
        y: ChannelConfig,
        /// Optional boolean "stick moved" channel.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        moved: Option<ChannelConfig>,
    },
    /// Fans out into finger curl/splay scalars under `output.parameter`.
    SkeletalSummary {
        output: ChannelConfig,
    },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Boolean { .. } => "boolean",
            ActionKind::Scalar { .. } => "scalar",
            ActionKind::Vector2 { .. } => "vector2",
            ActionKind::SkeletalSummary { .. } => "skeletal_summary",
        }
    }

    /// All configured output channels, in wire order.
    pub fn channels(&self) -> Vec<&ChannelConfig> {
        match self {
            ActionKind::Boolean { output, .. }
            | ActionKind::Scalar { output }
            | ActionKind::SkeletalSummary { output } => vec![output],
            ActionKind::Vector2 { x, y, moved } => {
                let mut channels = vec![x, y];
                channels.extend(moved.iter());
                channels
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.channels().iter().any(|c| c.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Backend-specific action identifier.
    pub name: String,

    #[serde(flatten)]
    pub kind: ActionKind,
}

impl ActionDescriptor {
    pub fn boolean(name: impl Into<String>, output: ChannelConfig) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Boolean {
                output,
                toggle: false,
            },
        }
    }

    pub fn toggle(name: impl Into<String>, output: ChannelConfig) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Boolean {
                output,
                toggle: true,
            },
        }
    }

    pub fn scalar(name: impl Into<String>, output: ChannelConfig) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Scalar { output },
        }
    }

    pub fn vector2(
        name: impl Into<String>,
        x: ChannelConfig,
        y: ChannelConfig,
        moved: Option<ChannelConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Vector2 { x, y, moved },
        }
    }

    pub fn skeletal(name: impl Into<String>, output: ChannelConfig) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::SkeletalSummary { output },
        }
    }
}

/// Handle to an action registered with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(pub(crate) usize);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_descriptor_from_toml() {
        let descriptor: ActionDescriptor = toml::from_str(
            r#"
            name = "/actions/thumbparams/in/leftstick"
            type = "vector2"
            x = { parameter = "LeftStickX", hold = 0.25, unsigned = true }
            y = { parameter = "LeftStickY", enabled = false }
            moved = { parameter = "LeftStickMoved", policy = "always_send" }
            "#,
        )
        .unwrap();

        let ActionKind::Vector2 { x, y, moved } = &descriptor.kind else {
            panic!("expected vector2, got {:?}", descriptor.kind);
        };
        assert_eq!(x.hold_duration(), Some(Duration::from_millis(250)));
        assert!(x.unsigned);
        assert!(!y.enabled);
        assert_eq!(moved.as_ref().unwrap().policy, SendPolicy::AlwaysSend);
        assert_eq!(descriptor.kind.channels().len(), 3);
    }

    #[test]
    fn boolean_defaults() {
        let descriptor: ActionDescriptor = toml::from_str(
            r#"
            name = "/actions/thumbparams/in/lefta"
            type = "boolean"
            output = { parameter = "LeftAButton" }
            "#,
        )
        .unwrap();

        assert_eq!(
            descriptor.kind,
            ActionKind::Boolean {
                output: ChannelConfig::new("LeftAButton"),
                toggle: false,
            }
        );
    }

    #[test]
    fn zero_hold_is_disabled() {
        assert_eq!(ChannelConfig::new("A").hold_duration(), None);
        assert!(ChannelConfig::new("A").with_hold(-1.0).hold_duration().is_none());
    }

    #[test]
    fn unrepresentable_hold_is_disabled() {
        assert!(ChannelConfig::new("A").with_hold(1e20).hold_duration().is_none());
        assert!(ChannelConfig::new("A").with_hold(f64::NAN).hold_duration().is_none());
        assert_eq!(
            ChannelConfig::new("A").with_hold(0.25).hold_duration(),
            Some(Duration::from_millis(250))
        );
    }
}
