//! lk - loopkey CLI
//!
//! Record keyboard/mouse macros and play them back. Results are printed to
//! stdout as JSON (`{success, data, error}`); logs go to stderr.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loopkey_core::error::Error;
use loopkey_core::mock::RecordingSink;
use loopkey_core::{platform, InputSink, KeyId};
use loopkey_recorder::config;
use loopkey_recorder::prelude::*;

#[derive(Parser)]
#[command(name = "lk")]
#[command(about = "loopkey - record and replay keyboard/mouse macros")]
#[command(version)]
struct Cli {
    /// Settings file (default: platform config dir)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Macro directory (overrides settings)
    #[arg(long, global = true)]
    macro_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until the stop key (default Esc) or Ctrl+C
    Record {
        /// Defaults to a timestamp
        #[arg(short, long)]
        name: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        stop_key: Option<String>,
    },
    /// Play a saved macro
    Play {
        name: String,
        #[command(flatten)]
        playback: PlaybackArgs,
        /// Log synthesized input instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// List saved macros
    List,
    /// Show macro info
    Show {
        name: String,
        /// Include every event
        #[arg(long)]
        all: bool,
    },
    /// Rename a macro
    Rename { old: String, new: String },
    /// Delete a macro
    Delete { name: String },
    /// Hotkey mode: F7 records, Esc stops, F8 plays the last macro
    Run {
        /// Macro the play key starts with
        #[arg(long = "macro")]
        start_with: Option<String>,
        /// Do not save recordings made in this mode
        #[arg(long)]
        no_save: bool,
    },
    /// Print settings
    Config {
        /// Write default settings if no file exists
        #[arg(long)]
        init: bool,
    },
    /// Check/request input permissions
    Permissions {
        #[arg(long)]
        request: bool,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Minimum pointer travel between move samples, in pixels
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    no_keyboard: bool,
    #[arg(long)]
    no_pointer: bool,
    #[arg(long)]
    no_moves: bool,
    #[arg(long)]
    no_clicks: bool,
    #[arg(long)]
    no_scroll: bool,
}

impl FilterArgs {
    fn apply(&self, filter: &mut RecordingFilterConfig) {
        if let Some(t) = self.threshold {
            filter.movement_threshold_px = t;
        }
        filter.capture_keyboard &= !self.no_keyboard;
        filter.capture_pointer &= !self.no_pointer;
        filter.capture_pointer_movement &= !self.no_moves;
        filter.capture_pointer_clicks &= !self.no_clicks;
        filter.capture_pointer_scroll &= !self.no_scroll;
    }
}

#[derive(Args)]
struct PlaybackArgs {
    #[arg(short, long)]
    speed: Option<f64>,
    #[arg(short, long)]
    repeat: Option<u32>,
    /// Seconds between repeats
    #[arg(long)]
    repeat_delay: Option<f64>,
    /// Repeat until Ctrl+C
    #[arg(long = "loop")]
    loop_indefinitely: bool,
    /// Seconds to wait before starting
    #[arg(long)]
    countdown: Option<f64>,
}

impl PlaybackArgs {
    fn apply(&self, playback: &mut PlaybackConfig) {
        if let Some(s) = self.speed {
            playback.speed_multiplier = s;
        }
        if let Some(r) = self.repeat {
            playback.repeat_count = r;
        }
        if let Some(d) = self.repeat_delay {
            playback.repeat_delay_seconds = d;
        }
        if let Some(c) = self.countdown {
            playback.start_delay_seconds = c;
        }
        playback.loop_indefinitely |= self.loop_indefinitely;
    }
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(e: &Error) -> Output<()> {
        Output {
            success: false,
            data: None,
            error: serde_json::to_value(e).ok(),
        }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::error!("failed to encode output: {}", e),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,loopkey=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let result = run_command(cli);

    if let Err(e) = result {
        match e.downcast_ref::<Error>() {
            Some(err) => print_json(&Output::<()>::err(err)),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.settings, cli.macro_dir)?;
    match cli.command {
        Commands::Record { name, filter, stop_key } => record(&ctx, name, &filter, stop_key),
        Commands::Play { name, playback, dry_run } => play(&ctx, &name, &playback, dry_run),
        Commands::List => list(&ctx),
        Commands::Show { name, all } => show(&ctx, &name, all),
        Commands::Rename { old, new } => rename(&ctx, &old, &new),
        Commands::Delete { name } => delete(&ctx, &name),
        Commands::Run { start_with, no_save } => run_hotkeys(ctx, start_with.as_deref(), no_save),
        Commands::Config { init } => show_config(&ctx, init),
        Commands::Permissions { request } => permissions(request),
    }
}

/// Resolved settings and store for one invocation
struct Context {
    settings: Settings,
    settings_path: Option<PathBuf>,
    store: TimelineStore,
}

impl Context {
    fn load(settings_path: Option<PathBuf>, macro_dir: Option<PathBuf>) -> Result<Self> {
        let (mut settings, settings_path) = match settings_path {
            Some(path) => (Settings::load(&path)?, Some(path)),
            None => (Settings::load_or_default(), config::settings_path()),
        };
        if macro_dir.is_some() {
            settings.macro_dir = macro_dir;
        }
        let dir = settings
            .resolved_macro_dir()
            .ok_or_else(|| Error::config("could not determine macro directory"))?;
        let store = TimelineStore::with_dir(dir)?;
        Ok(Self { settings, settings_path, store })
    }
}

/// Flag flipped by Ctrl+C
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;
    Ok(interrupted)
}

fn ensure_permissions() -> Result<()> {
    if !loopkey_core::has_input_permissions() {
        eprintln!("Input Monitoring and Accessibility permissions required.");
        loopkey_core::request_input_permissions();
        return Err(Error::Subscription("input permissions not granted".to_string()).into());
    }
    Ok(())
}

// ── Commands ────────────────────────────────────────────────────────────────

fn record(
    ctx: &Context,
    name: Option<String>,
    args: &FilterArgs,
    stop_key: Option<String>,
) -> Result<()> {
    let mut filter = ctx.settings.recording.clone();
    args.apply(&mut filter);
    let stop_key = stop_key
        .map(KeyId::new)
        .unwrap_or_else(|| ctx.settings.hotkeys.stop_recording.clone());
    let name = name.unwrap_or_else(TimelineStore::default_name);

    ensure_permissions()?;
    let interrupted = interrupt_flag()?;

    let session = MacroRecorder::new(platform::current::backend())
        .filter(filter)
        .stop_key(Some(stop_key.clone()))
        .start()?;
    eprintln!("Recording '{}' (press {} or Ctrl+C to stop)", name, stop_key);

    let mut count = 0;
    while !interrupted.load(Ordering::SeqCst) && session.is_running() {
        if session.event_count() != count {
            count = session.event_count();
            eprint!("\r{} events", count);
            io::stderr().flush()?;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let outcome = session.stop()?;
    eprintln!();

    if outcome.timeline.is_empty() {
        return Err(Error::EmptyTimeline.into());
    }
    let saved = ctx.store.save(&outcome.timeline, &name)?;
    print_json(&Output::ok(serde_json::json!({
        "name": saved.name,
        "path": saved.path,
        "stopped_by": outcome.reason,
        "summary": outcome.timeline.summary(),
    })));
    Ok(())
}

fn play(ctx: &Context, name: &str, args: &PlaybackArgs, dry_run: bool) -> Result<()> {
    let timeline = ctx.store.load(name)?;
    let mut config = ctx.settings.playback.clone();
    args.apply(&mut config);

    let dry_sink = Arc::new(RecordingSink::new());
    let sink: Arc<dyn InputSink> = if dry_run {
        dry_sink.clone()
    } else {
        ensure_permissions()?;
        platform::current::backend()
    };

    let interrupted = interrupt_flag()?;
    let handle = spawn_playback(Player::new(sink), timeline, config.clone())?;
    eprintln!(
        "Playing '{}' at {}x{}",
        name,
        config.speed_multiplier,
        if config.loop_indefinitely { " (looping, Ctrl+C to stop)" } else { "" }
    );
    while !handle.is_finished() {
        if interrupted.load(Ordering::SeqCst) {
            handle.cancel();
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let report = handle.join()?;

    if dry_run {
        let actions: Vec<String> = dry_sink.actions().iter().map(|a| format!("{:?}", a)).collect();
        print_json(&Output::ok(serde_json::json!({ "report": report, "actions": actions })));
    } else {
        print_json(&Output::ok(report));
    }
    Ok(())
}

fn list(ctx: &Context) -> Result<()> {
    let names = ctx.store.list()?;
    print_json(&Output::ok(serde_json::json!({
        "dir": ctx.store.path(),
        "macros": names,
    })));
    Ok(())
}

fn show(ctx: &Context, name: &str, all: bool) -> Result<()> {
    let timeline = ctx.store.load(name)?;
    let mut data = serde_json::json!({
        "name": name,
        "summary": timeline.summary(),
    });
    if all {
        data["events"] = serde_json::to_value(&timeline)?;
    }
    print_json(&Output::ok(data));
    Ok(())
}

fn rename(ctx: &Context, old: &str, new: &str) -> Result<()> {
    let handle = ctx.store.rename(old, new)?;
    print_json(&Output::ok(handle));
    Ok(())
}

fn delete(ctx: &Context, name: &str) -> Result<()> {
    ctx.store.delete(name)?;
    print_json(&Output::ok(serde_json::json!({ "deleted": name })));
    Ok(())
}

fn run_hotkeys(ctx: Context, initial: Option<&str>, no_save: bool) -> Result<()> {
    ensure_permissions()?;
    let Context { settings, store, .. } = ctx;
    let hotkeys = settings.hotkeys.clone();
    let backend = platform::current::backend();
    let mut controller = Controller::new(backend.clone(), backend, settings, store)?;
    if let Some(name) = initial {
        controller.load(name)?;
    }

    let interrupted = interrupt_flag()?;
    controller.arm_hotkeys()?;
    eprintln!(
        "Hotkeys: {} record, {} stop, {} play. Ctrl+C to quit.",
        hotkeys.start_recording, hotkeys.stop_recording, hotkeys.play_macro
    );

    while !interrupted.load(Ordering::SeqCst) {
        let notice = match controller.tick(Duration::from_millis(100)) {
            Ok(Some(notice)) => notice,
            Ok(None) => continue,
            Err(e) => {
                // a failed action leaves the loop usable
                tracing::warn!("{}", e);
                print_line(&Output::<()>::err(&e));
                continue;
            }
        };
        match notice {
            Notice::RecordingStarted => {
                print_line(&Output::ok(serde_json::json!({ "recording": true })))
            }
            Notice::Recorded(timeline) => {
                let mut data = serde_json::json!({ "recorded": timeline.summary() });
                if !no_save && !timeline.is_empty() {
                    match controller.save(&timeline, &TimelineStore::default_name()) {
                        Ok(saved) => data["saved"] = serde_json::to_value(saved)?,
                        Err(e) => tracing::warn!("failed to save recording: {}", e),
                    }
                }
                print_line(&Output::ok(data));
            }
            Notice::PlaybackStarted => {
                print_line(&Output::ok(serde_json::json!({ "playing": true })))
            }
            Notice::PlaybackFinished(report) => print_line(&Output::ok(report)),
            Notice::Ignored(action) => tracing::debug!(?action, "hotkey ignored"),
        }
    }

    controller.disarm_hotkeys();
    controller.cancel_playback();
    if controller.state() == EngineState::Recording {
        controller.stop_capture()?;
    }
    Ok(())
}

/// One JSON object per line, for streaming modes
fn print_line<T: Serialize>(output: &T) {
    match serde_json::to_string(output) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::error!("failed to encode output: {}", e),
    }
}

fn show_config(ctx: &Context, init: bool) -> Result<()> {
    let path = ctx
        .settings_path
        .clone()
        .ok_or_else(|| Error::config("could not determine config directory"))?;
    let mut created = false;
    if init && !path.exists() {
        Settings::default().save(&path)?;
        created = true;
    }
    print_json(&Output::ok(serde_json::json!({
        "path": path,
        "created": created,
        "macro_dir": ctx.store.path(),
        "settings": ctx.settings,
    })));
    Ok(())
}

fn permissions(request: bool) -> Result<()> {
    let granted = if request {
        loopkey_core::request_input_permissions()
    } else {
        loopkey_core::has_input_permissions()
    };
    print_json(&Output::ok(serde_json::json!({ "input": granted })));
    Ok(())
}
