pub mod config;
pub mod dispatch;
pub mod driver;
pub mod input;
pub mod transport;

use crate::config::AppConfig;
use crate::driver::Driver;
use crate::input::gamepad::GamepadSource;
use crate::input::ActionSource;
use crate::transport::listener::ContextListener;
use crate::transport::sender::OscSender;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "thumbparams",
    about = "Takes controller input and sends it to an OSC client as avatar parameters",
    version
)]
struct Cli {
    /// Print the parameter table every tick
    #[arg(short, long)]
    debug: bool,

    /// OSC target address (overrides the config file)
    #[arg(short, long)]
    ip: Option<String>,

    /// OSC target port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    if let Err(e) = run(cli).await {
        error!("UNEXPECTED ERROR: {:?}", e);
        wait_for_operator();
        return Err(e);
    }
    Ok(())
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn wait_for_operator() {
    println!("Press ENTER to exit.");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_create(&path).await?;
    if let Some(ip) = cli.ip {
        config.osc.ip = ip;
    }
    if let Some(port) = cli.port {
        config.osc.port = port;
    }

    info!("thumbparams {} running", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", path.display());
    info!("IP: {}", config.osc.ip);
    info!("Port: {}", config.osc.port);
    info!("Server Port: {}", config.osc.server_port);
    info!(
        "Polling rate: {:?} ({} Hz)",
        config.poll_interval(),
        config.polling_rate
    );
    info!("Stick move tolerance: {}%", config.stick_move_tolerance);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            ctrl_c.cancel();
        }
    });

    let sender = OscSender::connect(&config.osc.ip, config.osc.port)?;

    let gamepad: Option<Box<dyn ActionSource>> = if config.gamepad_needed() {
        let source = GamepadSource::spawn(config.gamepad.clone(), shutdown.clone())?;
        Some(Box::new(source))
    } else {
        info!("Gamepad backend disabled");
        None
    };

    // the VR runtime binding plugs in here when one is linked
    let mut driver = Driver::new(&config, sender, None, gamepad, cli.debug);

    let (changes_tx, changes_rx) = mpsc::channel(16);
    let listener = if driver.engine().needs_context_listener() {
        let addr = transport::resolve(&config.osc.ip, config.osc.server_port)
            .map_err(|e| eyre!("Invalid listener address {}: {}", config.osc.ip, e))?;
        let listener = ContextListener::bind(addr).await?;
        Some(listener.spawn(changes_tx, shutdown.clone()))
    } else {
        info!("Every parameter is sent continuously, not listening for avatar changes");
        drop(changes_tx);
        None
    };

    let result = driver
        .run(changes_rx, shutdown.clone(), config.poll_interval())
        .await;
    shutdown.cancel();

    if let Some(handle) = listener {
        handle
            .await
            .map_err(|e| eyre!("Context listener task failed: {}", e))?;
    }
    result?;

    let sink = driver.engine().sink();
    info!(
        "Shutdown complete, {} datagrams sent to {}",
        sink.sent(),
        sink.target()
    );
    Ok(())
}
