//! Input backends
//!
//! An [`ActionSource`] abstracts one physical or virtual input backend. The driver
//! loop calls [`ActionSource::poll`] once per cycle and then reads every configured
//! action from the refreshed snapshot.
//!
//! ```text
//! Backend ──► poll() ──► snapshot ──► read(descriptor) ──► Value ──► DispatchEngine
//! ```
//!
//! The VR runtime binding lives outside this crate; [`gamepad`] provides the
//! gilrs-backed controller source.

pub mod gamepad;

use crate::dispatch::ActionDescriptor;

/// Finger curl and splay channels of a skeletal summary.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SkeletalSummary {
    /// Thumb, Index, Middle, Ring, Pinky.
    pub curl: [f32; 5],
    /// Thumb-Index, Index-Middle, Middle-Ring, Ring-Pinky.
    pub splay: [f32; 4],
}

/// A freshly sampled action value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Boolean(bool),
    Scalar(f32),
    Vector2(f32, f32),
    Skeletal(SkeletalSummary),
    /// The backend has nothing for this action right now.
    NoData,
}

impl Value {
    pub fn label(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Scalar(_) => "scalar",
            Value::Vector2(..) => "vector2",
            Value::Skeletal(_) => "skeletal_summary",
            Value::NoData => "no data",
        }
    }
}

/// Controller family reported by the VR runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerKind {
    #[default]
    Unknown,
    Knuckles,
    OculusTouch,
}

/// Offset added to the controller type when a gamepad is plugged in.
const GAMEPAD_OFFSET: i32 = 10;

impl ControllerKind {
    /// Maps the runtime's controller type string.
    pub fn from_type_string(controller_type: &str) -> Self {
        match controller_type {
            "knuckles" => ControllerKind::Knuckles,
            "oculus_touch" => ControllerKind::OculusTouch,
            _ => ControllerKind::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ControllerKind::Unknown => 0,
            ControllerKind::Knuckles => 1,
            ControllerKind::OculusTouch => 2,
        }
    }
}

/// Value published as the `ControllerType` parameter.
pub fn controller_type_code(kind: ControllerKind, gamepad_plugged: bool) -> i32 {
    if gamepad_plugged {
        kind.code() + GAMEPAD_OFFSET
    } else {
        kind.code()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// Backend not ready or device gone; recovered by retrying on the next poll.
    #[error("Input backend unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl InputError {
    pub fn is_transient(&self) -> bool {
        matches!(self, InputError::Unavailable(_))
    }
}

pub trait ActionSource: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Drains pending backend events and refreshes the action snapshot.
    fn poll(&mut self) -> Result<(), InputError>;

    /// Current value of `action` in the last polled snapshot.
    fn read(&self, action: &ActionDescriptor) -> Result<Value, InputError>;

    /// Low-frequency controller type lookup.
    fn controller_kind(&mut self) -> ControllerKind {
        ControllerKind::Unknown
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub mod scripted {
    use super::*;
    use std::collections::HashMap;

    /// Source returning values from a map, keyed by action name.
    #[derive(Debug, Default)]
    pub struct ScriptedSource {
        pub values: HashMap<String, Value>,
        pub kind: ControllerKind,
        pub connected: bool,
        pub polls: usize,
    }

    impl ScriptedSource {
        pub fn set(&mut self, action: &str, value: Value) {
            self.values.insert(action.to_string(), value);
        }
    }

    impl ActionSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn poll(&mut self) -> Result<(), InputError> {
            self.polls += 1;
            Ok(())
        }

        fn read(&self, action: &ActionDescriptor) -> Result<Value, InputError> {
            self.values
                .get(&action.name)
                .copied()
                .ok_or_else(|| InputError::UnknownAction(action.name.clone()))
        }

        fn controller_kind(&mut self) -> ControllerKind {
            self.kind
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }
}
