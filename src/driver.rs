//! The polling loop tying input backends to the dispatch engine.
//!
//! One tick:
//!
//! ```text
//! poll backends ─► refresh clock ─► ControllerType (if due)
//!               ─► touch actions 0..7 ─► LeftThumb/RightThumb/AB chords
//!               ─► VR actions ─► gamepad actions ─► debug table
//! ```
//!
//! Context changes arrive on a channel and are applied between ticks, so the
//! engine never has more than one writer.

use crate::config::AppConfig;
use crate::dispatch::{introspect, ActionId, DispatchEngine, DispatchError, TouchBits};
use crate::input::{controller_type_code, ActionSource, ControllerKind, InputError, Value};
use crate::transport::{ContextChange, ParameterSink, TransportError};
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// An input backend plus its last known availability.
struct Backend {
    source: Box<dyn ActionSource>,
    available: bool,
}

impl Backend {
    fn new(source: Box<dyn ActionSource>) -> Self {
        Self {
            source,
            available: false,
        }
    }

    /// Transient failures mark the backend unavailable for this tick; the
    /// next poll retries it.
    fn absorb(&mut self, result: Result<(), InputError>) -> Result<bool, InputError> {
        match result {
            Ok(()) => {
                if !self.available {
                    info!("{} backend available", self.source.name());
                    self.available = true;
                }
                Ok(true)
            }
            Err(e) if e.is_transient() => {
                if self.available {
                    warn!("{} backend lost: {}", self.source.name(), e);
                } else {
                    trace!("{} backend still unavailable: {}", self.source.name(), e);
                }
                self.available = false;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn poll(&mut self) -> Result<bool, InputError> {
        let result = self.source.poll();
        self.absorb(result)
    }

    /// `Ok(None)` when the backend went away while reading.
    fn read<S: ParameterSink>(
        &mut self,
        engine: &DispatchEngine<S>,
        id: ActionId,
    ) -> Result<Option<Value>, DriverError> {
        let descriptor = engine
            .descriptor(id)
            .ok_or(DispatchError::UnknownAction(id))?;
        match self.source.read(descriptor) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.absorb(Err(e))?;
                Ok(None)
            }
        }
    }
}

#[derive(Debug)]
struct LoopStats {
    started: DateTime<Local>,
    last_report: Instant,
    ticks: u64,
    sent_at_report: u64,
}

impl LoopStats {
    fn new() -> Self {
        Self {
            started: Local::now(),
            last_report: Instant::now(),
            ticks: 0,
            sent_at_report: 0,
        }
    }

    fn record(&mut self, now: Instant, sent: u64) {
        self.ticks += 1;
        let elapsed = now.saturating_duration_since(self.last_report);
        if elapsed < STATS_INTERVAL {
            return;
        }
        info!(
            "Loop stats: {} ticks, {} messages in the last {:.0}s (running since {})",
            self.ticks,
            sent - self.sent_at_report,
            elapsed.as_secs_f64(),
            self.started.format("%H:%M:%S")
        );
        self.ticks = 0;
        self.sent_at_report = sent;
        self.last_report = now;
    }
}

pub struct Driver<S> {
    engine: DispatchEngine<S>,
    vr: Option<Backend>,
    gamepad: Option<Backend>,
    touch: Vec<ActionId>,
    actions: Vec<ActionId>,
    gamepad_actions: Vec<ActionId>,
    debug: bool,
    stats: LoopStats,
}

impl<S: ParameterSink> Driver<S> {
    /// Registers every configured action with a fresh engine.
    pub fn new(
        config: &AppConfig,
        sink: S,
        vr: Option<Box<dyn ActionSource>>,
        gamepad: Option<Box<dyn ActionSource>>,
        debug: bool,
    ) -> Self {
        let mut engine = DispatchEngine::new(sink, config.engine_settings(), config.special);
        let mut register = |actions: &[crate::dispatch::ActionDescriptor]| -> Vec<ActionId> {
            actions
                .iter()
                .map(|action| engine.register(action.clone()))
                .collect()
        };
        let touch = register(&config.touch);
        let actions = register(&config.actions);
        let gamepad_actions = register(&config.gamepad_actions);

        info!(
            "Driver ready with {} actions ({})",
            engine.action_count(),
            config.describe()
        );

        Self {
            engine,
            vr: vr.map(Backend::new),
            gamepad: gamepad.map(Backend::new),
            touch,
            actions,
            gamepad_actions,
            debug,
            stats: LoopStats::new(),
        }
    }

    pub fn engine(&self) -> &DispatchEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DispatchEngine<S> {
        &mut self.engine
    }

    /// Runs one polling cycle with `now` as the clock snapshot.
    pub fn tick(&mut self, now: Instant) -> Result<(), DriverError> {
        let vr_ready = match self.vr.as_mut() {
            Some(backend) => backend.poll()?,
            None => false,
        };
        let gamepad_ready = match self.gamepad.as_mut() {
            Some(backend) => backend.poll()?,
            None => false,
        };
        self.engine.refresh_time(now);

        if self.engine.controller_type_due() {
            let kind = match self.vr.as_mut() {
                Some(backend) if vr_ready => backend.source.controller_kind(),
                _ => ControllerKind::Unknown,
            };
            let plugged = gamepad_ready
                && self
                    .gamepad
                    .as_ref()
                    .is_some_and(|backend| backend.source.is_connected());
            let code = controller_type_code(kind, plugged);
            debug!("Controller type {:?} (gamepad plugged: {}) -> {}", kind, plugged, code);
            self.engine.dispatch_controller_type(code);
        }

        if vr_ready {
            self.dispatch_vr()?;
        }
        if gamepad_ready {
            self.dispatch_gamepad()?;
        }

        self.stats.record(now, self.engine.sent());
        Ok(())
    }

    /// Touch actions in fixed order, the derived parameters, then the
    /// remaining VR actions. Stops early if the backend goes away.
    fn dispatch_vr(&mut self) -> Result<(), DriverError> {
        let Some(vr) = self.vr.as_mut() else {
            return Ok(());
        };

        if !self.touch.is_empty() {
            let mut touched = TouchBits::default();
            for (slot, id) in self.touch.iter().enumerate() {
                let Some(value) = vr.read(&self.engine, *id)? else {
                    return Ok(());
                };
                if let Value::Boolean(sample) = value {
                    touched.0[slot] = sample;
                }
                self.engine.dispatch(*id, value)?;
            }
            trace!("Touch bits {:?}", touched.0);
            self.engine.dispatch_touch(touched);
        }

        for id in &self.actions {
            let Some(value) = vr.read(&self.engine, *id)? else {
                return Ok(());
            };
            self.engine.dispatch(*id, value)?;
        }
        Ok(())
    }

    fn dispatch_gamepad(&mut self) -> Result<(), DriverError> {
        let Some(gamepad) = self.gamepad.as_mut() else {
            return Ok(());
        };

        for id in &self.gamepad_actions {
            let Some(value) = gamepad.read(&self.engine, *id)? else {
                return Ok(());
            };
            self.engine.dispatch(*id, value)?;
        }
        Ok(())
    }

    fn print_debug_table(&self) {
        // clear screen, cursor home
        print!("\x1B[2J\x1B[1;1H");
        println!("{}", introspect::render_table(&self.engine.parameters()));
    }

    /// Ticks every `period` until `shutdown` fires, applying context changes
    /// between ticks.
    pub async fn run(
        &mut self,
        mut contexts: mpsc::Receiver<ContextChange>,
        shutdown: CancellationToken,
        period: Duration,
    ) -> Result<(), DriverError> {
        info!("Starting dispatch loop every {:?}", period);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping dispatch loop");
                    break;
                }

                Some(change) = contexts.recv() => {
                    self.engine.resync(&change.context_id);
                }

                _ = ticker.tick() => {
                    self.tick(Instant::now())?;
                    if self.debug {
                        self.print_debug_table();
                    }
                }
            }
        }

        info!("Dispatch loop stopped after {} messages", self.engine.sent());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ActionDescriptor, ChannelConfig, SyntheticConfig};
    use crate::input::scripted::ScriptedSource;
    use crate::transport::recording::RecordingSink;
    use crate::transport::ParamValue;

    const TOUCH: [&str; 8] = [
        "lefta", "leftb", "leftpad", "leftstick", "righta", "rightb", "rightpad", "rightstick",
    ];

    fn config() -> AppConfig {
        let mut special = SyntheticConfig::default();
        special.controller_type.enabled = false;
        AppConfig {
            special,
            touch: TOUCH
                .iter()
                .map(|name| ActionDescriptor::boolean(*name, ChannelConfig::new(*name).disabled()))
                .collect(),
            actions: vec![ActionDescriptor::scalar(
                "trigger",
                ChannelConfig::new("Trigger"),
            )],
            gamepad_actions: vec![ActionDescriptor::boolean("A", ChannelConfig::new("XboxA"))],
            ..AppConfig::default()
        }
    }

    fn vr_source(touch: &str, trigger: f32) -> ScriptedSource {
        let mut source = ScriptedSource {
            connected: true,
            ..ScriptedSource::default()
        };
        for (name, bit) in TOUCH.iter().zip(touch.chars()) {
            source.set(name, Value::Boolean(bit == '1'));
        }
        source.set("trigger", Value::Scalar(trigger));
        source
    }

    fn gamepad_source(a: bool, connected: bool) -> ScriptedSource {
        let mut source = ScriptedSource {
            connected,
            ..ScriptedSource::default()
        };
        source.set("A", Value::Boolean(a));
        source
    }

    #[test]
    fn tick_dispatches_touch_then_actions_then_gamepad() {
        let mut driver = Driver::new(
            &config(),
            RecordingSink::default(),
            Some(Box::new(vr_source("10000011", 0.5))),
            Some(Box::new(gamepad_source(true, true))),
            false,
        );

        driver.tick(Instant::now()).unwrap();
        let names: Vec<String> = driver
            .engine_mut()
            .sink_mut()
            .take()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["LeftThumb", "RightThumb", "Trigger", "XboxA"]);
    }

    #[test]
    fn thumb_values_follow_touch_bits() {
        let mut driver = Driver::new(
            &config(),
            RecordingSink::default(),
            Some(Box::new(vr_source("11000001", 0.0))),
            None,
            false,
        );

        driver.tick(Instant::now()).unwrap();
        let sink = driver.engine().sink();
        assert_eq!(sink.values_for("LeftThumb"), vec![ParamValue::Int(2)]);
        assert_eq!(sink.values_for("RightThumb"), vec![ParamValue::Int(4)]);
        assert_eq!(sink.values_for("LeftABButtons"), vec![ParamValue::Bool(true)]);
    }

    #[test]
    fn controller_type_reports_gamepad_offset() {
        let mut config = config();
        config.special.controller_type.enabled = true;
        let mut vr = vr_source("00000000", 0.0);
        vr.kind = ControllerKind::Knuckles;
        let mut driver = Driver::new(
            &config,
            RecordingSink::default(),
            Some(Box::new(vr)),
            Some(Box::new(gamepad_source(false, true))),
            false,
        );

        driver.tick(Instant::now()).unwrap();
        assert_eq!(
            driver.engine().sink().values_for("ControllerType"),
            vec![ParamValue::Int(11)]
        );
    }

    #[test]
    fn runs_without_vr_backend() {
        let mut driver = Driver::new(
            &config(),
            RecordingSink::default(),
            None,
            Some(Box::new(gamepad_source(true, true))),
            false,
        );

        driver.tick(Instant::now()).unwrap();
        assert_eq!(
            driver.engine().sink().values_for("XboxA"),
            vec![ParamValue::Bool(true)]
        );
        assert!(driver.engine().sink().values_for("LeftThumb").is_empty());
    }

    struct UnpluggedSource;

    impl ActionSource for UnpluggedSource {
        fn name(&self) -> &str {
            "unplugged"
        }

        fn poll(&mut self) -> Result<(), InputError> {
            Err(InputError::Unavailable("no device".to_string()))
        }

        fn read(&self, action: &ActionDescriptor) -> Result<Value, InputError> {
            Err(InputError::UnknownAction(action.name.clone()))
        }
    }

    #[test]
    fn transient_unavailability_is_not_an_error() {
        let mut driver = Driver::new(
            &config(),
            RecordingSink::default(),
            Some(Box::new(UnpluggedSource)),
            Some(Box::new(gamepad_source(true, true))),
            false,
        );

        driver.tick(Instant::now()).unwrap();
        assert_eq!(driver.engine().sink().sent.len(), 1);
    }

    #[test]
    fn unknown_action_is_fatal() {
        let mut config = config();
        config
            .actions
            .push(ActionDescriptor::scalar("missing", ChannelConfig::new("Missing")));
        let mut driver = Driver::new(
            &config,
            RecordingSink::default(),
            Some(Box::new(vr_source("00000000", 0.0))),
            None,
            false,
        );

        assert!(matches!(
            driver.tick(Instant::now()),
            Err(DriverError::Input(InputError::UnknownAction(_)))
        ));
    }

    #[tokio::test]
    async fn run_applies_context_changes_until_cancelled() {
        let mut driver = Driver::new(
            &config(),
            RecordingSink::default(),
            Some(Box::new(vr_source("00000000", 0.75))),
            None,
            false,
        );
        let (tx, rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        let canceller = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                tx.send(ContextChange {
                    context_id: "avtr_1".to_string(),
                })
                .await
                .unwrap();
                tokio::time::sleep(Duration::from_millis(30)).await;
                shutdown.cancel();
            })
        };

        driver
            .run(rx, shutdown, Duration::from_millis(5))
            .await
            .unwrap();
        canceller.await.unwrap();

        assert_eq!(driver.engine().context_id(), Some("avtr_1"));
        // once on change, once on resync
        assert_eq!(
            driver.engine().sink().values_for("Trigger"),
            vec![ParamValue::Float(0.75), ParamValue::Float(0.75)]
        );
    }
}
