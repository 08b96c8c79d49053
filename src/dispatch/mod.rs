//! # Dispatch
//!
//! Decides, for every configured action and every tick, whether and what to send.
//!
//! ```text
//! dispatch/
//! ├── action.rs     - static action descriptors and channel configuration
//! ├── channel.rs    - hold window and send policy for a single channel
//! ├── binary.rs     - sign + magnitude bit encoding of floats
//! ├── skeletal.rs   - finger curl/splay fan-out
//! ├── synthetic.rs  - ControllerType, thumb position and AB chords
//! ├── engine.rs     - DispatchEngine: per-action state, resync
//! ├── introspect.rs - debug table rendering
//! └── error.rs
//! ```
//!
//! The engine is single-writer: the driver loop owns it and resync requests are
//! delivered to that loop instead of touching the state from another task.

pub mod action;
pub mod binary;
pub mod channel;
pub mod engine;
pub mod error;
pub mod introspect;
pub mod skeletal;
pub mod synthetic;

pub use action::{ActionDescriptor, ActionId, ActionKind, ChannelConfig, SendPolicy};
pub use engine::{ChannelView, DispatchEngine, EngineSettings};
pub use error::DispatchError;
pub use synthetic::{SpecialParameter, SyntheticConfig, TouchBits};
