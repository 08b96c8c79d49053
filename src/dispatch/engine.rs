//! The parameter dispatch engine.
//!
//! Owns the runtime state of every registered action and of the synthetic
//! parameters. The driver loop feeds it one sample per action per tick; the
//! engine decides what goes out through its [`ParameterSink`].
//!
//! All hold comparisons inside one tick use the same clock snapshot, set with
//! [`DispatchEngine::refresh_time`].

use super::action::{ActionDescriptor, ActionId, ActionKind, ChannelConfig};
use super::binary;
use super::channel::{evaluate, ChannelState, ChannelValue};
use super::error::DispatchError;
use super::skeletal;
use super::synthetic::{SyntheticConfig, SyntheticParameter, TouchBits};
use crate::input::{SkeletalSummary, Value};
use crate::transport::{ParamValue, ParameterSink};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Minimum time between two controller type lookups.
pub const CONTROLLER_TYPE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Fraction of full deflection above which a stick counts as moved.
    pub stick_tolerance: f32,
    /// Magnitude bits used for binary-encoded channels.
    pub binary_bits: u8,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stick_tolerance: 0.05,
            binary_bits: 4,
        }
    }
}

/// A channel's configuration together with its runtime state.
#[derive(Debug, Clone)]
struct Channel<T> {
    config: ChannelConfig,
    state: ChannelState<T>,
}

impl<T: ChannelValue> Channel<T> {
    fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            state: ChannelState::default(),
        }
    }

    fn evaluate(&mut self, sample: T, now: Instant) -> Option<T> {
        evaluate(&self.config, &mut self.state, sample, now)
    }
}

#[derive(Debug, Clone)]
enum ActionSlot {
    Boolean {
        output: Channel<bool>,
        toggle: bool,
        /// Raw source level of the previous sample, for edge detection.
        pressed: bool,
    },
    Scalar {
        output: Channel<f32>,
    },
    Vector2 {
        x: Channel<f32>,
        y: Channel<f32>,
        moved: Option<Channel<bool>>,
    },
    Skeletal {
        fingers: Vec<Channel<f32>>,
    },
}

impl ActionSlot {
    fn for_kind(kind: &ActionKind) -> Self {
        match kind {
            ActionKind::Boolean { output, toggle } => ActionSlot::Boolean {
                output: Channel::new(output.clone()),
                toggle: *toggle,
                pressed: false,
            },
            ActionKind::Scalar { output } => ActionSlot::Scalar {
                output: Channel::new(output.clone()),
            },
            ActionKind::Vector2 { x, y, moved } => ActionSlot::Vector2 {
                x: Channel::new(x.clone()),
                y: Channel::new(y.clone()),
                moved: moved.clone().map(Channel::new),
            },
            ActionKind::SkeletalSummary { output } => ActionSlot::Skeletal {
                fingers: skeletal::fan_out(output)
                    .into_iter()
                    .map(Channel::new)
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredAction {
    descriptor: ActionDescriptor,
    slot: ActionSlot,
}

impl RegisteredAction {
    fn mismatch(&self, got: &'static str) -> DispatchError {
        DispatchError::KindMismatch {
            action: self.descriptor.name.clone(),
            expected: self.descriptor.kind.label(),
            got,
        }
    }
}

#[derive(Debug, Clone)]
struct Synthetics {
    controller_type: Channel<i32>,
    left_thumb: Channel<i32>,
    right_thumb: Channel<i32>,
    left_ab: Channel<bool>,
    right_ab: Channel<bool>,
}

impl Synthetics {
    fn new(config: &SyntheticConfig) -> Self {
        let channel = |parameter: SyntheticParameter| config.get(parameter).channel(parameter);
        Self {
            controller_type: Channel::new(channel(SyntheticParameter::ControllerType)),
            left_thumb: Channel::new(channel(SyntheticParameter::LeftThumb)),
            right_thumb: Channel::new(channel(SyntheticParameter::RightThumb)),
            left_ab: Channel::new(channel(SyntheticParameter::LeftABButtons)),
            right_ab: Channel::new(channel(SyntheticParameter::RightABButtons)),
        }
    }
}

/// Read-only view of one output channel, used for resync and introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelView<'a> {
    pub config: &'a ChannelConfig,
    pub last: ParamValue,
    pub toggle: bool,
}

fn view<'a, T: ChannelValue + Into<ParamValue>>(channel: &'a Channel<T>) -> ChannelView<'a> {
    ChannelView {
        config: &channel.config,
        last: channel.state.last.into(),
        toggle: false,
    }
}

/// Every channel in wire order: synthetics first, then actions in registration order.
fn channel_views<'a>(
    synthetics: &'a Synthetics,
    actions: &'a [RegisteredAction],
) -> Vec<ChannelView<'a>> {
    let mut views = vec![
        view(&synthetics.controller_type),
        view(&synthetics.left_thumb),
        view(&synthetics.right_thumb),
        view(&synthetics.left_ab),
        view(&synthetics.right_ab),
    ];

    for action in actions {
        match &action.slot {
            ActionSlot::Boolean { output, toggle, .. } => views.push(ChannelView {
                toggle: *toggle,
                ..view(output)
            }),
            ActionSlot::Scalar { output } => views.push(view(output)),
            ActionSlot::Vector2 { x, y, moved } => {
                views.push(view(x));
                views.push(view(y));
                views.extend(moved.iter().map(view));
            }
            ActionSlot::Skeletal { fingers } => views.extend(fingers.iter().map(view)),
        }
    }
    views
}

/// Sink wrapper that counts messages and expands binary channels.
#[derive(Debug)]
struct Outbox<S> {
    sink: S,
    binary_bits: u8,
    sent: u64,
}

impl<S: ParameterSink> Outbox<S> {
    fn send(&mut self, parameter: &str, value: ParamValue) {
        trace!("{} = {}", parameter, value);
        self.sink.send_parameter(parameter, value);
        self.sent += 1;
    }

    fn send_float(&mut self, channel: &ChannelConfig, value: f32) {
        if channel.binary {
            for (parameter, bit) in
                binary::bit_parameters(&channel.parameter, value, self.binary_bits)
            {
                self.send(&parameter, ParamValue::Bool(bit));
            }
        } else {
            self.send(&channel.parameter, ParamValue::Float(value));
        }
    }

    fn send_last(&mut self, view: &ChannelView<'_>) {
        match view.last {
            ParamValue::Float(value) => self.send_float(view.config, value),
            other => self.send(&view.config.parameter, other),
        }
    }
}

pub struct DispatchEngine<S> {
    outbox: Outbox<S>,
    settings: EngineSettings,
    actions: Vec<RegisteredAction>,
    synthetics: Synthetics,
    now: Instant,
    context_id: Option<String>,
    controller_type_checked: Option<Instant>,
}

impl<S: ParameterSink> DispatchEngine<S> {
    pub fn new(sink: S, settings: EngineSettings, synthetic: SyntheticConfig) -> Self {
        debug!("Creating dispatch engine with settings: {:?}", settings);
        Self {
            outbox: Outbox {
                sink,
                binary_bits: settings.binary_bits.clamp(1, binary::MAX_BITS),
                sent: 0,
            },
            settings,
            actions: Vec::new(),
            synthetics: Synthetics::new(&synthetic),
            now: Instant::now(),
            context_id: None,
            controller_type_checked: None,
        }
    }

    pub fn register(&mut self, descriptor: ActionDescriptor) -> ActionId {
        let id = ActionId(self.actions.len());
        debug!(
            "Registered {} action '{}' as {}",
            descriptor.kind.label(),
            descriptor.name,
            id
        );
        self.actions.push(RegisteredAction {
            slot: ActionSlot::for_kind(&descriptor.kind),
            descriptor,
        });
        id
    }

    pub fn descriptor(&self, id: ActionId) -> Option<&ActionDescriptor> {
        self.actions.get(id.0).map(|action| &action.descriptor)
    }

    /// Sets the clock snapshot used by every dispatch until the next refresh.
    pub fn refresh_time(&mut self, now: Instant) {
        self.now = now;
    }

    /// Routes a freshly sampled value to the matching dispatch operation.
    pub fn dispatch(&mut self, id: ActionId, value: Value) -> Result<(), DispatchError> {
        match value {
            Value::Boolean(sample) => self.dispatch_boolean(id, sample),
            Value::Scalar(sample) => self.dispatch_scalar(id, sample),
            Value::Vector2(x, y) => self.dispatch_vector2(id, x, y),
            Value::Skeletal(summary) => self.dispatch_skeletal(id, Some(&summary)),
            Value::NoData => {
                let action = self
                    .actions
                    .get(id.0)
                    .ok_or(DispatchError::UnknownAction(id))?;
                trace!("No data for '{}'", action.descriptor.name);
                Ok(())
            }
        }
    }

    pub fn dispatch_boolean(&mut self, id: ActionId, sample: bool) -> Result<(), DispatchError> {
        let now = self.now;
        let action = self
            .actions
            .get_mut(id.0)
            .ok_or(DispatchError::UnknownAction(id))?;
        let ActionSlot::Boolean {
            output,
            toggle,
            pressed,
        } = &mut action.slot
        else {
            return Err(action.mismatch("boolean"));
        };

        if !*toggle {
            if let Some(value) = output.evaluate(sample, now) {
                self.outbox.send(&output.config.parameter, value.into());
            }
            return Ok(());
        }

        if !output.config.enabled {
            return Ok(());
        }
        let rising = sample && !*pressed;
        *pressed = sample;
        if rising {
            output.state.last = !output.state.last;
            debug!(
                "Toggled {} to {}",
                output.config.parameter, output.state.last
            );
            self.outbox
                .send(&output.config.parameter, output.state.last.into());
        } else if output.config.policy.is_always() {
            self.outbox
                .send(&output.config.parameter, output.state.last.into());
        }
        Ok(())
    }

    pub fn dispatch_scalar(&mut self, id: ActionId, sample: f32) -> Result<(), DispatchError> {
        let now = self.now;
        let action = self
            .actions
            .get_mut(id.0)
            .ok_or(DispatchError::UnknownAction(id))?;
        let ActionSlot::Scalar { output } = &mut action.slot else {
            return Err(action.mismatch("scalar"));
        };

        if let Some(value) = output.evaluate(sample, now) {
            self.outbox.send_float(&output.config, value);
        }
        Ok(())
    }

    pub fn dispatch_vector2(&mut self, id: ActionId, x: f32, y: f32) -> Result<(), DispatchError> {
        let now = self.now;
        let tolerance = self.settings.stick_tolerance;
        let action = self
            .actions
            .get_mut(id.0)
            .ok_or(DispatchError::UnknownAction(id))?;
        let ActionSlot::Vector2 {
            x: x_channel,
            y: y_channel,
            moved,
        } = &mut action.slot
        else {
            return Err(action.mismatch("vector2"));
        };

        let is_moved = x.abs() > tolerance || y.abs() > tolerance;

        for (channel, raw) in [(x_channel, x), (y_channel, y)] {
            let sample = if channel.config.unsigned {
                binary::unsigned_remap(raw)
            } else {
                raw
            };
            if let Some(value) = channel.evaluate(sample, now) {
                self.outbox.send_float(&channel.config, value);
            }
        }

        if let Some(moved) = moved {
            if let Some(value) = moved.evaluate(is_moved, now) {
                self.outbox.send(&moved.config.parameter, value.into());
            }
        }
        Ok(())
    }

    /// `None` means the backend had no skeletal data this tick.
    pub fn dispatch_skeletal(
        &mut self,
        id: ActionId,
        sample: Option<&SkeletalSummary>,
    ) -> Result<(), DispatchError> {
        let now = self.now;
        let action = self
            .actions
            .get_mut(id.0)
            .ok_or(DispatchError::UnknownAction(id))?;
        let ActionSlot::Skeletal { fingers } = &mut action.slot else {
            return Err(action.mismatch("skeletal_summary"));
        };
        let Some(summary) = sample else {
            return Ok(());
        };

        for (channel, sample) in fingers.iter_mut().zip(skeletal::samples(summary)) {
            if let Some(value) = channel.evaluate(sample, now) {
                self.outbox.send_float(&channel.config, value);
            }
        }
        Ok(())
    }

    /// Dispatches the thumb position and AB chord parameters derived from
    /// the eight touch inputs.
    pub fn dispatch_touch(&mut self, touch: TouchBits) {
        let now = self.now;
        let synthetics = &mut self.synthetics;

        for (channel, sample) in [
            (&mut synthetics.left_thumb, touch.left_thumb()),
            (&mut synthetics.right_thumb, touch.right_thumb()),
        ] {
            if let Some(value) = channel.evaluate(sample, now) {
                self.outbox.send(&channel.config.parameter, value.into());
            }
        }

        for (channel, sample) in [
            (&mut synthetics.left_ab, touch.left_ab()),
            (&mut synthetics.right_ab, touch.right_ab()),
        ] {
            if let Some(value) = channel.evaluate(sample, now) {
                self.outbox.send(&channel.config.parameter, value.into());
            }
        }
    }

    /// Whether the controller type should be looked up this tick.
    pub fn controller_type_due(&self) -> bool {
        let channel = &self.synthetics.controller_type.config;
        if !channel.enabled {
            return false;
        }
        channel.policy.is_always()
            || self.controller_type_checked.map_or(true, |at| {
                self.now.saturating_duration_since(at) > CONTROLLER_TYPE_INTERVAL
            })
    }

    pub fn dispatch_controller_type(&mut self, code: i32) {
        self.controller_type_checked = Some(self.now);
        let channel = &mut self.synthetics.controller_type;
        if let Some(value) = channel.evaluate(code, self.now) {
            self.outbox.send(&channel.config.parameter, value.into());
        }
    }

    /// Retransmits the last value of every enabled channel after a context
    /// change. Returns `false` if `context_id` is already the current one.
    ///
    /// Send policies are bypassed and no state is modified apart from the
    /// stored context identifier.
    pub fn resync(&mut self, context_id: &str) -> bool {
        if self.context_id.as_deref() == Some(context_id) {
            trace!("Context {} unchanged, skipping resync", context_id);
            return false;
        }

        info!("Resending parameters to {}", context_id);
        self.context_id = Some(context_id.to_string());

        let before = self.outbox.sent;
        for view in channel_views(&self.synthetics, &self.actions) {
            if view.config.enabled {
                self.outbox.send_last(&view);
            }
        }
        debug!("Resync sent {} messages", self.outbox.sent - before);
        true
    }

    /// `false` when every enabled channel is AlwaysSend, which makes context
    /// notifications irrelevant.
    pub fn needs_context_listener(&self) -> bool {
        channel_views(&self.synthetics, &self.actions)
            .iter()
            .any(|view| view.config.enabled && !view.config.policy.is_always())
    }

    /// Enabled channels with their last transmitted values.
    pub fn parameters(&self) -> Vec<ChannelView<'_>> {
        channel_views(&self.synthetics, &self.actions)
            .into_iter()
            .filter(|view| view.config.enabled)
            .collect()
    }

    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Messages handed to the sink since creation.
    pub fn sent(&self) -> u64 {
        self.outbox.sent
    }

    pub fn sink(&self) -> &S {
        &self.outbox.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.outbox.sink
    }
}
