//! Wavy Bird terminal front end (default binary).
//!
//! Stands in for the game loop: ticks at a fixed rate, drains the event
//! slots every frame and shows what it consumed next to the device status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use wavy_bird::cli::{self, AppArgs};
use wavy_bird::device::{
    current_timestamp_ms, list_ports, DeviceLink, LinkCallbacks, LinkConfig, ReplayPortProvider,
    SerialPortProvider,
};
use wavy_bird::frame::{DeviceRequest, FrameInput};
use wavy_bird::input::{handle_key_event, should_quit, EventSlots};
use wavy_bird::types::{ConnectionState, TICK_MS};
use wavy_bird::view::StatusView;

fn main() -> Result<()> {
    let args = cli::parse_args()?;
    if args.help {
        print!("{}", cli::HELP);
        return Ok(());
    }
    if args.list_ports {
        return print_ports();
    }

    init_logging()?;

    let rt = tokio::runtime::Runtime::new()?;
    let _enter = rt.enter();

    let slots = Arc::new(EventSlots::new());
    let link = if LinkConfig::is_disabled() {
        info!("device input disabled via WAVY_SERIAL_DISABLED");
        None
    } else {
        Some(Arc::new(build_link(&args, Arc::clone(&slots))))
    };

    if let (Some(link), true) = (&link, args.connect) {
        spawn_connect(&rt, link);
    }

    let mut view = StatusView::stdout();
    view.enter()?;

    let result = run(&rt, &mut view, link.as_ref(), slots);

    // Always try to restore terminal state.
    let _ = view.exit();
    if let Some(link) = &link {
        rt.block_on(link.disconnect());
    }
    result
}

fn print_ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        let kind = if port.usb { "usb" } else { "other" };
        match port.product {
            Some(product) => println!("{}\t{}\t{}", port.name, kind, product),
            None => println!("{}\t{}", port.name, kind),
        }
    }
    Ok(())
}

/// Logs go to `WAVY_LOG_PATH` when set; otherwise nothing is installed so the
/// raw-mode terminal stays clean.
fn init_logging() -> Result<()> {
    let Some(path) = std::env::var_os("WAVY_LOG_PATH") else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.to_string_lossy()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn build_link(args: &AppArgs, slots: Arc<EventSlots>) -> DeviceLink {
    let mut config = LinkConfig::from_env();
    if args.port.is_some() {
        config.port = args.port.clone();
    }
    config.baud_rate = args.baud_rate_or(config.baud_rate);

    let callbacks = LinkCallbacks::new()
        .on_open(|| info!("accelerometer ready"))
        .on_close(|| info!("accelerometer closed, keyboard input only"))
        .on_error(|err| warn!(kind = err.kind(), "device error: {}", err))
        .on_line(move |line| {
            if let Some(event) = line.to_event(current_timestamp_ms()) {
                slots.publish(event);
            }
        });

    match &args.replay {
        Some(path) => DeviceLink::new(config, ReplayPortProvider::new(path), callbacks),
        None => {
            let port = config.port.clone();
            DeviceLink::new(config, SerialPortProvider::new(port), callbacks)
        }
    }
}

fn spawn_connect(rt: &tokio::runtime::Runtime, link: &Arc<DeviceLink>) {
    let link = Arc::clone(link);
    rt.spawn(async move {
        // Failures are reported through the state and `on_error`.
        let _ = link.connect().await;
    });
}

fn run(
    rt: &tokio::runtime::Runtime,
    view: &mut StatusView<std::io::Stdout>,
    link: Option<&Arc<DeviceLink>>,
    slots: Arc<EventSlots>,
) -> Result<()> {
    let mut input = FrameInput::new(slots);
    let mut notice = String::new();

    let mut last_tick = Instant::now();
    let tick_duration = Duration::from_millis(TICK_MS as u64);

    loop {
        // Input with timeout until next tick.
        let timeout = tick_duration
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) => match key.kind {
                    KeyEventKind::Press => {
                        if should_quit(key) {
                            return Ok(());
                        }

                        let Some(intent) = handle_key_event(key) else {
                            continue;
                        };
                        match input.key_press(intent, key.code, current_timestamp_ms()) {
                            Some(DeviceRequest::Toggle) => match link {
                                Some(link) => spawn_connect(rt, link),
                                None => notice = "device input disabled".to_string(),
                            },
                            Some(DeviceRequest::Calibrate) => {
                                notice = calibrate(rt, link);
                            }
                            None => {}
                        }
                    }
                    KeyEventKind::Repeat => {
                        // Ignore terminal auto-repeat; held tilts repeat internally.
                    }
                    KeyEventKind::Release => {
                        input.key_release(key.code);
                    }
                },
                Event::Resize(_, _) => view.invalidate(),
                _ => {}
            }
        }

        // Tick.
        if last_tick.elapsed() >= tick_duration {
            last_tick = Instant::now();

            let state = link.map(|l| l.state()).unwrap_or_default();
            let report = input.tick(TICK_MS, current_timestamp_ms(), state);
            for event in &report.events {
                debug!(frame = report.frame, ?event, "frame input");
            }

            let mut rows = vec![
                "WAVY BIRD".to_string(),
                input.status_line(&report),
            ];
            if let Some(link) = link {
                let config = link.config();
                rows.push(format!(
                    "device: {} @ {} baud",
                    config.port.as_deref().unwrap_or("auto"),
                    config.baud_rate
                ));
            }
            if state == ConnectionState::Error {
                if let Some(err) = link.and_then(|l| l.last_error()) {
                    rows.push(format!("error: {err}"));
                }
            }
            if !notice.is_empty() {
                rows.push(notice.clone());
            }
            rows.push("space flap | arrows tilt | - device | = calibrate | q quit".to_string());
            view.draw(&rows)?;
        }
    }
}

fn calibrate(rt: &tokio::runtime::Runtime, link: Option<&Arc<DeviceLink>>) -> String {
    let Some(link) = link.filter(|l| l.state().is_connected()) else {
        debug!("calibrate ignored: device not connected");
        return "connect the device before calibrating".to_string();
    };

    let link = Arc::clone(link);
    rt.spawn(async move {
        if let Err(err) = link.calibrate().await {
            warn!(error = %err, "calibration failed");
        }
    });
    "calibrating: hold the device still".to_string()
}
