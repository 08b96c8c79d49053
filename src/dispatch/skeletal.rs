//! Skeletal summary fan-out.
//!
//! A skeletal action publishes nine scalars: five finger curls and four splays
//! between neighbouring fingers. Each one is an ordinary scalar channel derived
//! from the parent's [`ChannelConfig`].

use super::action::ChannelConfig;
use crate::input::SkeletalSummary;

pub const CURL_FINGERS: [&str; 5] = ["Thumb", "Index", "Middle", "Ring", "Pinky"];

/// Splay channels are named after the second finger of each pair.
pub const SPLAY_FINGERS: [&str; 4] = ["Index", "Middle", "Ring", "Pinky"];

pub const CHANNEL_COUNT: usize = CURL_FINGERS.len() + SPLAY_FINGERS.len();

/// The derived scalar channels of `parent`, curls first.
pub fn fan_out(parent: &ChannelConfig) -> Vec<ChannelConfig> {
    let curls = CURL_FINGERS
        .iter()
        .map(|finger| derive(parent, "Curl", finger));
    let splays = SPLAY_FINGERS
        .iter()
        .map(|finger| derive(parent, "Splay", finger));
    curls.chain(splays).collect()
}

fn derive(parent: &ChannelConfig, group: &str, finger: &str) -> ChannelConfig {
    ChannelConfig {
        parameter: format!("{}/{}/{}", parent.parameter, group, finger),
        ..parent.clone()
    }
}

/// Sample values in [`fan_out`] order.
pub fn samples(summary: &SkeletalSummary) -> [f32; CHANNEL_COUNT] {
    let mut values = [0.0; CHANNEL_COUNT];
    values[..5].copy_from_slice(&summary.curl);
    values[5..].copy_from_slice(&summary.splay);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::action::SendPolicy;

    #[test]
    fn derives_named_channels_sharing_parent_policy() {
        let parent = ChannelConfig::new("LeftHand")
            .with_policy(SendPolicy::AlwaysSend)
            .with_hold(0.1);
        let channels = fan_out(&parent);

        assert_eq!(channels.len(), CHANNEL_COUNT);
        assert_eq!(channels[0].parameter, "LeftHand/Curl/Thumb");
        assert_eq!(channels[4].parameter, "LeftHand/Curl/Pinky");
        assert_eq!(channels[5].parameter, "LeftHand/Splay/Index");
        assert_eq!(channels[8].parameter, "LeftHand/Splay/Pinky");
        assert!(channels
            .iter()
            .all(|c| c.policy == SendPolicy::AlwaysSend && c.hold == 0.1));
    }

    #[test]
    fn samples_follow_channel_order() {
        let summary = SkeletalSummary {
            curl: [0.1, 0.2, 0.3, 0.4, 0.5],
            splay: [0.6, 0.7, 0.8, 0.9],
        };
        let values = samples(&summary);
        assert_eq!(values[0], 0.1);
        assert_eq!(values[5], 0.6);
        assert_eq!(values[8], 0.9);
    }
}
