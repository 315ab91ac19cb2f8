//! # SensorLink console monitor
//!
//! Connects to the sensor board, prints one line per reading and accepts
//! actuator commands on stdin.
//!
//! ## Usage
//! ```bash
//! sensorlink /dev/ttyUSB0              # Real board
//! sensorlink --demo                    # Simulated board
//! sensorlink --replay capture.txt      # Play back a serial capture
//! sensorlink --list                    # Show serial ports
//! sensorlink --config my.json COM3     # Custom config file
//! ```
//!
//! Stdin commands: `on`, `off`, `clear`, `status`, `json`, `quit`.

use anyhow::{bail, Context, Result};
use sensorlink_core::config::MonitorConfig;
use sensorlink_core::controller::Controller;
use sensorlink_core::demo::{DemoBoard, ReplayChannel};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Default)]
struct Args {
    port: Option<String>,
    config: Option<PathBuf>,
    replay: Option<PathBuf>,
    demo: bool,
    list: bool,
    save_config: bool,
}

enum Source {
    Port(String),
    Demo,
    Replay(PathBuf),
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--demo" => args.demo = true,
            "--list" => args.list = true,
            "--save-config" => args.save_config = true,
            "--config" => {
                args.config = Some(it.next().context("--config needs a path")?.into());
            }
            "--replay" => {
                args.replay = Some(it.next().context("--replay needs a path")?.into());
            }
            "-h" | "--help" => {
                println!("usage: sensorlink [PORT] [--config FILE] [--demo | --replay FILE] [--list] [--save-config]");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option {other}"),
            other => args.port = Some(other.to_string()),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sensorlink_core=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args()?;

    if args.list {
        for port in Controller::list_ports() {
            match (&port.product, port.vid, port.pid) {
                (Some(product), Some(vid), Some(pid)) => {
                    println!("{}  {product} ({vid:04x}:{pid:04x})", port.name)
                }
                _ => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let config_path = args.config.clone().unwrap_or_else(MonitorConfig::default_path);
    let config = MonitorConfig::load_or_default(&config_path);
    if args.save_config {
        config
            .save(&config_path)
            .with_context(|| format!("saving {}", config_path.display()))?;
        info!("Saved config to {}", config_path.display());
    }

    let source = if args.demo {
        Source::Demo
    } else if let Some(path) = args.replay.clone() {
        Source::Replay(path)
    } else if let Some(port) = args.port.clone().or_else(|| config.port.clone()) {
        Source::Port(port)
    } else {
        bail!("no port given; pass PORT, --demo or --replay (see --list)");
    };

    let controller = Controller::from_config(&config).context("opening sample log")?;
    controller.initialize();
    controller.on_log_line(|line| println!("{line}"));
    controller.on_connect_success(|port| info!("Listening on {port}"));
    controller.on_connect_error(|message| warn!("{message}"));
    controller.on_disconnected(|| info!("Link closed"));

    match source {
        Source::Port(port) => controller
            .connect(&port)
            .with_context(|| format!("connecting to {port}"))?,
        Source::Demo => controller.connect_channel("demo", Box::new(DemoBoard::default()))?,
        Source::Replay(path) => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("reading capture {}", path.display()))?;
            let (channel, _handle) = ReplayChannel::from_capture(&bytes);
            controller.connect_channel(&path.display().to_string(), Box::new(channel))?;
        }
    }

    info!(
        "Logging to {}; commands: on, off, clear, status, json, quit",
        config.log_path.display()
    );

    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        match line.trim() {
            "on" => report_send(controller.send_actuator_on()),
            "off" => report_send(controller.send_actuator_off()),
            "clear" => controller.clear_history(),
            "status" => {
                let snap = controller.snapshot();
                println!(
                    "{:?} {} | window {} | {:?}",
                    controller.state(),
                    controller.port_name().unwrap_or_default(),
                    snap.len(),
                    controller.stats()
                );
            }
            "json" => println!("{}", serde_json::to_string(&controller.snapshot())?),
            "quit" | "exit" => break,
            "" => {}
            other => warn!("unknown command '{other}'"),
        }
    }

    controller.disconnect();
    Ok(())
}

fn report_send(sent: bool) {
    if !sent {
        warn!("command not sent: not connected");
    }
}
