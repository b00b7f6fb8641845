//! hwc-probe - Bring up the hwcomposer backend and report what it found
//!
//! Opens the composer and the backlight through libhybris, logs the
//! negotiated output, and optionally cycles the panel through blank and
//! unblank to exercise power, backlight and vsync control.
//!
//! # Usage
//!
//! ```sh
//! # Report the display and exit
//! hwc-probe
//!
//! # Blank and unblank the panel three times
//! hwc-probe --cycle 3
//! ```
//!
//! Logging follows `RUST_LOG`; `HWC_DEBUG_*` variables override the panel
//! geometry.

use std::env;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use calloop::channel::Event;
use calloop::EventLoop;

use hwcomposer::hal::hybris::HybrisModule;
use hwcomposer::{Config, DebugOverrides, HwcomposerBackend, RenderLoop};

/// How long each blank state is held while cycling
const CYCLE_HOLD: Duration = Duration::from_secs(2);

/// Render loop stand-in that only logs what the backend asks of it
#[derive(Debug, Default)]
struct ProbeRenderLoop {
    completed: u64,
}

impl RenderLoop for ProbeRenderLoop {
    fn pending_frame_count(&self) -> usize {
        0
    }

    fn notify_frame_completed(&mut self, timestamp: Duration) {
        self.completed += 1;
        tracing::trace!(?timestamp, completed = self.completed, "frame completed");
    }

    fn schedule_repaint(&mut self) {
        tracing::debug!("repaint requested");
    }
}

struct Probe {
    backend: HwcomposerBackend,
}

fn main() -> Result<()> {
    setup_logging();

    let args: Vec<String> = env::args().collect();
    let cycles = parse_cycles(&args)?;

    let config = Config::load();
    let overrides = DebugOverrides::from_env();

    let module = HybrisModule::load().context("failed to load hwcomposer module")?;
    let lights = module.open_lights();

    let (backend, sources) = HwcomposerBackend::new(
        &module,
        lights,
        config,
        overrides,
        Box::new(ProbeRenderLoop::default()),
    )?;

    let output = backend.output();
    tracing::info!(
        version = %backend.version(),
        size = ?output.pixel_size(),
        logical = ?output.logical_size(),
        physical_mm = ?output.physical_size(),
        refresh = output.refresh_rate(),
        scale = output.scale(),
        "display"
    );

    let mut event_loop: EventLoop<Probe> = EventLoop::try_new()?;
    event_loop
        .handle()
        .insert_source(sources.messages, |event, _, probe: &mut Probe| {
            if let Event::Msg(message) = event {
                probe.backend.handle_message(message);
            }
        })
        .map_err(|e| anyhow::anyhow!("failed to insert backend channel: {e}"))?;

    let mut probe = Probe { backend };

    for cycle in 0..toggle_count(cycles) {
        probe.backend.toggle_blank_output();
        tracing::info!(cycle = cycle / 2, blanked = probe.backend.is_blanked(), "holding");

        let until = Instant::now() + CYCLE_HOLD;
        while Instant::now() < until {
            event_loop.dispatch(Some(Duration::from_millis(100)), &mut probe)?;
        }
    }

    // Dropping the backend leaves the panel on
    drop(probe);
    Ok(())
}

/// One blank and one unblank per cycle
fn toggle_count(cycles: u32) -> u64 {
    u64::from(cycles) * 2
}

fn parse_cycles(args: &[String]) -> Result<u32> {
    match args.get(1).map(String::as_str) {
        None => Ok(0),
        Some("--cycle") => {
            let Some(count) = args.get(2) else {
                bail!("missing count after --cycle");
            };
            count
                .parse()
                .with_context(|| format!("invalid cycle count: {count}"))
        }
        Some(other) => bail!("unknown argument: {other}\nusage: hwc-probe [--cycle N]"),
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,smithay=warn"));

    // Respect NO_COLOR environment variable
    let use_ansi = env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_ansi(use_ansi),
        )
        .with(filter)
        .init();
}
