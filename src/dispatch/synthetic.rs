//! Derived parameters that are not backed by a single action query.

use super::action::{ChannelConfig, SendPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticParameter {
    ControllerType,
    LeftThumb,
    RightThumb,
    LeftABButtons,
    RightABButtons,
}

impl SyntheticParameter {
    pub fn name(self) -> &'static str {
        match self {
            SyntheticParameter::ControllerType => "ControllerType",
            SyntheticParameter::LeftThumb => "LeftThumb",
            SyntheticParameter::RightThumb => "RightThumb",
            SyntheticParameter::LeftABButtons => "LeftABButtons",
            SyntheticParameter::RightABButtons => "RightABButtons",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecialParameter {
    pub enabled: bool,
    #[serde(default)]
    pub policy: SendPolicy,
}

impl Default for SpecialParameter {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: SendPolicy::OnChange,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyntheticConfig {
    #[serde(default)]
    pub controller_type: SpecialParameter,
    #[serde(default)]
    pub left_thumb: SpecialParameter,
    #[serde(default)]
    pub right_thumb: SpecialParameter,
    #[serde(default, rename = "LeftABButtons")]
    pub left_ab_buttons: SpecialParameter,
    #[serde(default, rename = "RightABButtons")]
    pub right_ab_buttons: SpecialParameter,
}

impl SyntheticConfig {
    pub fn get(&self, parameter: SyntheticParameter) -> SpecialParameter {
        match parameter {
            SyntheticParameter::ControllerType => self.controller_type,
            SyntheticParameter::LeftThumb => self.left_thumb,
            SyntheticParameter::RightThumb => self.right_thumb,
            SyntheticParameter::LeftABButtons => self.left_ab_buttons,
            SyntheticParameter::RightABButtons => self.right_ab_buttons,
        }
    }

    /// Same config with every parameter disabled.
    pub fn none() -> Self {
        let off = SpecialParameter {
            enabled: false,
            policy: SendPolicy::OnChange,
        };
        Self {
            controller_type: off,
            left_thumb: off,
            right_thumb: off,
            left_ab_buttons: off,
            right_ab_buttons: off,
        }
    }
}

impl SpecialParameter {
    pub(crate) fn channel(&self, parameter: SyntheticParameter) -> ChannelConfig {
        let channel = ChannelConfig::new(parameter.name()).with_policy(self.policy);
        if self.enabled {
            channel
        } else {
            channel.disabled()
        }
    }
}

/// The eight touch booleans in fixed order:
/// left A, B, trackpad, stick, then right A, B, trackpad, stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchBits(pub [bool; 8]);

impl TouchBits {
    /// Parses a string of `0`/`1` characters, e.g. `"10000000"`.
    pub fn parse(bits: &str) -> Option<Self> {
        let mut touched = [false; 8];
        if bits.len() != touched.len() {
            return None;
        }
        for (slot, c) in touched.iter_mut().zip(bits.chars()) {
            *slot = match c {
                '0' => false,
                '1' => true,
                _ => return None,
            };
        }
        Some(Self(touched))
    }

    /// 1-based position of the highest touched input of one hand, 0 if none.
    fn thumb(hand: &[bool]) -> i32 {
        hand.iter()
            .rposition(|touched| *touched)
            .map_or(0, |index| index as i32 + 1)
    }

    pub fn left_thumb(&self) -> i32 {
        Self::thumb(&self.0[..4])
    }

    pub fn right_thumb(&self) -> i32 {
        Self::thumb(&self.0[4..])
    }

    pub fn left_ab(&self) -> bool {
        self.0[0] && self.0[1]
    }

    pub fn right_ab(&self) -> bool {
        self.0[4] && self.0[5]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> TouchBits {
        TouchBits::parse(s).unwrap()
    }

    #[test]
    fn thumb_positions() {
        assert_eq!(bits("10000000").left_thumb(), 1);
        assert_eq!(bits("10000000").right_thumb(), 0);
        assert_eq!(bits("00000001").right_thumb(), 4);
        assert_eq!(bits("00000000").left_thumb(), 0);
        assert_eq!(bits("00000000").right_thumb(), 0);
    }

    #[test]
    fn simultaneous_touches_pick_highest_index() {
        assert_eq!(bits("11000000").left_thumb(), 2);
        assert_eq!(bits("00001011").right_thumb(), 4);
    }

    #[test]
    fn ab_chords() {
        assert!(bits("11000000").left_ab());
        assert!(!bits("10000000").left_ab());
        assert!(bits("00001100").right_ab());
        assert!(!bits("11000000").right_ab());
    }

    #[test]
    fn rejects_malformed_bit_strings() {
        assert!(TouchBits::parse("1000").is_none());
        assert!(TouchBits::parse("1000000x").is_none());
    }

    #[test]
    fn parses_special_parameters_by_name() {
        let config: SyntheticConfig = toml::from_str(
            r#"
            [ControllerType]
            enabled = true
            policy = "always_send"

            [LeftABButtons]
            enabled = false
            "#,
        )
        .unwrap();

        assert!(config.controller_type.policy.is_always());
        assert!(!config.left_ab_buttons.enabled);
        assert!(config.right_thumb.enabled);
    }
}
