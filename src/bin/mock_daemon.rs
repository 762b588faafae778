//! Mock kanata server. Accepts one client at a time and cycles through a
//! list of layer names, writing one `LayerChange` document per step in the
//! same unframed format kanata uses.
//!
//! Run with:
//!     cargo run --bin kanata-indicator-mock-daemon -- --port 10000 base nav sym
//!
//! Press Ctrl-C to quit.  Killing and restarting it is a quick way to watch
//! the indicator hide and, without systemd, stay hidden.

use log::{info, warn};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

/// Milliseconds between each layer change.
const STEP_MS: u64 = 1000;

const DEFAULT_PORT: u16 = 10000;

struct Options {
    port: u16,
    step: Duration,
    layers: Vec<String>,
}

fn parse_args() -> Result<Options, String> {
    let mut port = DEFAULT_PORT;
    let mut step = Duration::from_millis(STEP_MS);
    let mut layers = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" => {
                let value = args.next().ok_or("--port needs a value")?;
                port = value.parse().map_err(|e| format!("bad port {}: {}", value, e))?;
            }
            "--interval-ms" => {
                let value = args.next().ok_or("--interval-ms needs a value")?;
                let ms: u64 = value
                    .parse()
                    .map_err(|e| format!("bad interval {}: {}", value, e))?;
                step = Duration::from_millis(ms);
            }
            other => layers.push(other.to_string()),
        }
    }

    if layers.is_empty() {
        layers = vec!["base".into(), "nav".into(), "sym".into()];
    }
    Ok(Options { port, step, layers })
}

/// Stream layer changes to one client until it disconnects.
fn serve(mut stream: TcpStream, options: &Options) {
    for layer in options.layers.iter().cycle() {
        let message = serde_json::json!({ "LayerChange": { "new": layer } });
        if let Err(e) = stream.write_all(message.to_string().as_bytes()) {
            info!("client gone: {}", e);
            return;
        }
        info!("sent layer {}", layer);
        std::thread::sleep(options.step);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let listener = match TcpListener::bind(("127.0.0.1", options.port)) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind port {}: {}", options.port, e);
            std::process::exit(1);
        }
    };
    info!("mock kanata listening on 127.0.0.1:{}", options.port);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                info!("client connected");
                serve(stream, &options);
            }
            Err(e) => warn!("accept error: {}", e),
        }
    }
}
