//! Send decision and hold logic for a single output channel.
//!
//! Every channel the engine publishes (primary, vector axis, skeletal finger or
//! synthetic) goes through [`evaluate`]. The function is pure apart from the
//! channel state it is handed, which keeps the temporal rules testable without a
//! transport.

use super::action::{ChannelConfig, SendPolicy};
use std::time::{Duration, Instant};

/// Values a channel can carry.
///
/// `rises_from`/`falls_from` define what "pressed" and "released" mean for the
/// hold logic: booleans rise whenever the sample is true and fall when it is
/// false, numbers rise on an increase and fall on a decrease.
pub trait ChannelValue: Copy + PartialEq + Default {
    fn is_truthy(&self) -> bool;
    fn rises_from(&self, last: &Self) -> bool;
    fn falls_from(&self, last: &Self) -> bool;
}

impl ChannelValue for bool {
    fn is_truthy(&self) -> bool {
        *self
    }

    fn rises_from(&self, _last: &Self) -> bool {
        *self
    }

    fn falls_from(&self, _last: &Self) -> bool {
        !*self
    }
}

impl ChannelValue for f32 {
    fn is_truthy(&self) -> bool {
        *self != 0.0
    }

    fn rises_from(&self, last: &Self) -> bool {
        self > last
    }

    fn falls_from(&self, last: &Self) -> bool {
        self < last
    }
}

impl ChannelValue for i32 {
    fn is_truthy(&self) -> bool {
        *self != 0
    }

    fn rises_from(&self, last: &Self) -> bool {
        self > last
    }

    fn falls_from(&self, last: &Self) -> bool {
        self < last
    }
}

/// Mutable runtime state of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelState<T> {
    /// Last value actually transmitted.
    pub last: T,
    /// Time of the last rising transition, if any.
    pub changed_at: Option<Instant>,
}

impl<T: ChannelValue> ChannelState<T> {
    pub fn new(last: T) -> Self {
        Self {
            last,
            changed_at: None,
        }
    }
}

impl SendPolicy {
    pub fn should_send<T: ChannelValue>(self, sample: &T, last: &T) -> bool {
        match self {
            SendPolicy::AlwaysSend => true,
            SendPolicy::OnChange => sample != last,
            SendPolicy::SendIfTruthy => sample.is_truthy(),
        }
    }
}

/// Applies the hold window to `sample`, returning the value to evaluate.
pub fn apply_hold<T: ChannelValue>(
    hold: Option<Duration>,
    state: &mut ChannelState<T>,
    sample: T,
    now: Instant,
) -> T {
    let Some(hold) = hold else {
        return sample;
    };

    if sample.rises_from(&state.last) {
        state.changed_at = Some(now);
    } else if sample.falls_from(&state.last) {
        let within_hold = state
            .changed_at
            .is_some_and(|at| now.saturating_duration_since(at) <= hold);
        if within_hold {
            return state.last;
        }
    }
    sample
}

/// Runs hold + send decision for one channel.
///
/// Returns the value to transmit and records it as the channel's last value, or
/// `None` when nothing should go out this cycle. Disabled channels are left
/// untouched.
pub fn evaluate<T: ChannelValue>(
    config: &ChannelConfig,
    state: &mut ChannelState<T>,
    sample: T,
    now: Instant,
) -> Option<T> {
    if !config.enabled {
        return None;
    }

    let value = apply_hold(config.hold_duration(), state, sample, now);
    if !config.policy.should_send(&value, &state.last) {
        return None;
    }

    state.last = value;
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn on_change_suppresses_repeats() {
        let config = ChannelConfig::new("Trigger");
        let mut state = ChannelState::new(0.0f32);
        let now = Instant::now();

        assert_eq!(evaluate(&config, &mut state, 0.5, now), Some(0.5));
        assert_eq!(evaluate(&config, &mut state, 0.5, now), None);
        assert_eq!(evaluate(&config, &mut state, 0.25, now), Some(0.25));
    }

    #[test]
    fn send_if_truthy_only_sends_truthy_samples() {
        let config = ChannelConfig::new("A").with_policy(SendPolicy::SendIfTruthy);
        let mut state = ChannelState::new(false);
        let now = Instant::now();

        assert_eq!(evaluate(&config, &mut state, true, now), Some(true));
        assert_eq!(evaluate(&config, &mut state, true, now), Some(true));
        assert_eq!(evaluate(&config, &mut state, false, now), None);
        assert!(state.last);
    }

    #[test]
    fn always_send_repeats() {
        let config = ChannelConfig::new("A").with_policy(SendPolicy::AlwaysSend);
        let mut state = ChannelState::new(false);
        let now = Instant::now();

        assert_eq!(evaluate(&config, &mut state, false, now), Some(false));
        assert_eq!(evaluate(&config, &mut state, false, now), Some(false));
    }

    #[test]
    fn boolean_release_is_held() {
        let config = ChannelConfig::new("A").with_hold(0.5);
        let mut state = ChannelState::new(false);
        let base = Instant::now();

        assert_eq!(evaluate(&config, &mut state, true, at(base, 0)), Some(true));
        // released 300ms later: still inside the window, nothing changes
        assert_eq!(evaluate(&config, &mut state, false, at(base, 300)), None);
        assert!(state.last);
        assert_eq!(evaluate(&config, &mut state, false, at(base, 600)), Some(false));
    }

    #[test]
    fn boolean_hold_substitutes_last_value_under_always_send() {
        let config = ChannelConfig::new("A")
            .with_hold(0.5)
            .with_policy(SendPolicy::AlwaysSend);
        let mut state = ChannelState::new(false);
        let base = Instant::now();

        assert_eq!(evaluate(&config, &mut state, true, at(base, 0)), Some(true));
        assert_eq!(evaluate(&config, &mut state, false, at(base, 300)), Some(true));
        assert_eq!(evaluate(&config, &mut state, false, at(base, 600)), Some(false));
    }

    #[test]
    fn holding_true_refreshes_the_window() {
        let config = ChannelConfig::new("A").with_hold(0.5);
        let mut state = ChannelState::new(false);
        let base = Instant::now();

        evaluate(&config, &mut state, true, at(base, 0));
        evaluate(&config, &mut state, true, at(base, 400));
        assert_eq!(evaluate(&config, &mut state, false, at(base, 800)), None);
        assert_eq!(evaluate(&config, &mut state, false, at(base, 950)), Some(false));
    }

    #[test]
    fn scalar_decrease_is_held() {
        let config = ChannelConfig::new("Trigger").with_hold(0.2);
        let mut state = ChannelState::new(0.0f32);
        let base = Instant::now();

        assert_eq!(evaluate(&config, &mut state, 0.8, at(base, 0)), Some(0.8));
        assert_eq!(evaluate(&config, &mut state, 0.3, at(base, 100)), None);
        assert_eq!(state.last, 0.8);
        assert_eq!(evaluate(&config, &mut state, 0.3, at(base, 250)), Some(0.3));
    }

    #[test]
    fn scalar_increase_is_never_held() {
        let config = ChannelConfig::new("Trigger").with_hold(1.0);
        let mut state = ChannelState::new(0.2f32);
        let base = Instant::now();

        assert_eq!(evaluate(&config, &mut state, 0.6, at(base, 0)), Some(0.6));
        assert_eq!(evaluate(&config, &mut state, 0.9, at(base, 10)), Some(0.9));
    }

    #[test]
    fn release_without_prior_press_is_not_held() {
        let config = ChannelConfig::new("Trigger").with_hold(1.0);
        let mut state = ChannelState::new(0.5f32);

        assert_eq!(evaluate(&config, &mut state, 0.1, Instant::now()), Some(0.1));
    }

    #[test]
    fn disabled_channel_is_untouched() {
        let config = ChannelConfig::new("A").with_hold(1.0).disabled();
        let mut state = ChannelState::new(false);

        assert_eq!(evaluate(&config, &mut state, true, Instant::now()), None);
        assert_eq!(state, ChannelState::new(false));
    }
}
