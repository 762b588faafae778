//! Entry point for **kanata-indicator**.
//!
//! Loads the configuration, starts the signal listener, and hands control to
//! either the GTK main loop (default) or a plain blocking loop that prints
//! the layer to stdout (`--text`, or builds without `indicator-gtk`).

use kanata_indicator::config::{config_dir, Config};
use kanata_indicator::coordinator::{self, ReconnectCoordinator};
use kanata_indicator::event::Event;
use kanata_indicator::indicator::text::TextIndicator;
use kanata_indicator::systemd::bus::SystemdBus;
use kanata_indicator::systemd::monitor::ServiceStateMonitor;
use kanata_indicator::traits::Indicator;
use log::{error, info};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::{mpsc, Arc};

const USAGE: &str = "\
usage: kanata-indicator [--text]

  --text    print the active layer to stdout instead of showing an overlay

Configuration is read from $XDG_CONFIG_HOME/kanata-indicator/config.json.";

fn load_config() -> Config {
    match config_dir() {
        Some(dir) => Config::load_or_default(&dir.join("config.json")),
        None => {
            info!("neither XDG_CONFIG_HOME nor HOME is set, using default config");
            Config::default()
        }
    }
}

//  Main

fn main() {
    env_logger::init();

    let mut text_mode = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--text" => text_mode = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return;
            }
            other => {
                eprintln!("unknown argument: {}\n\n{}", other, USAGE);
                std::process::exit(2);
            }
        }
    }

    let config = load_config();
    let (events_tx, events_rx) = mpsc::channel::<Event>();
    spawn_signal_listener(events_tx.clone());

    if text_mode {
        run_text(config, events_tx, events_rx);
    } else {
        run_gtk(config, events_tx, events_rx);
    }
}

/// Wire the coordinator to the system bus.  Without a bus the indicator
/// still connects once; it just cannot follow kanata restarts.
fn build_coordinator<I: Indicator>(
    config: &Config,
    indicator: I,
    events_tx: mpsc::Sender<Event>,
) -> ReconnectCoordinator<I, SystemdBus> {
    let mut coordinator = ReconnectCoordinator::new(config.target(), indicator, events_tx);
    coordinator.set_connect_timeout(config.connect_timeout());
    match SystemdBus::system() {
        Ok(bus) => {
            coordinator.set_monitor(ServiceStateMonitor::new(Arc::new(bus), config.unit()));
        }
        Err(e) => error!("skip watching {}: {}", config.service_name, e),
    }
    coordinator
}

#[cfg(feature = "indicator-gtk")]
fn run_gtk(config: Config, events_tx: mpsc::Sender<Event>, events_rx: mpsc::Receiver<Event>) {
    let css_path = config_dir().map(|dir| dir.join("style.css"));
    let result = kanata_indicator::indicator::gtk::run_main_loop(
        |indicator| build_coordinator(&config, indicator, events_tx),
        events_rx,
        css_path,
        &config.indicator,
    );
    if let Err(e) = result {
        error!("failed to initialise GTK4: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "indicator-gtk"))]
fn run_gtk(config: Config, events_tx: mpsc::Sender<Event>, events_rx: mpsc::Receiver<Event>) {
    info!("built without GTK support, printing the layer to stdout");
    run_text(config, events_tx, events_rx);
}

fn run_text(config: Config, events_tx: mpsc::Sender<Event>, events_rx: mpsc::Receiver<Event>) {
    let indicator = TextIndicator::new(std::io::stdout(), &config.indicator.initial_text);
    let coordinator = build_coordinator(&config, indicator, events_tx);
    coordinator::run_blocking(coordinator, events_rx);
}

//  Helpers

/// Turn SIGINT / SIGTERM / SIGHUP into [`Event::Shutdown`].
fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    let mut signals = match Signals::new([SIGINT, SIGTERM, SIGHUP]) {
        Ok(signals) => signals,
        Err(e) => {
            error!("failed to install signal handlers: {}", e);
            return;
        }
    };
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("received signal {}, shutting down", signal);
            let _ = tx.send(Event::Shutdown);
        }
    });
}
