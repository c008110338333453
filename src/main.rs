//! input-recorder
//!
//! Records OS-level mouse and keyboard input and replays it with the
//! original timing. Runs headless: global hotkeys drive the recorder.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use input_recorder::config::Config;
use input_recorder::data::{key_name, TimelineStore};
use input_recorder::input::{self, CaptureEngine, CaptureMode, HookRouter};
use input_recorder::logging;
use input_recorder::playback::RdevSynth;
use input_recorder::session::{
    create_session_channel, SessionCommand, SessionController, SessionSettings, SessionStatus,
};

/// Command line options
#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    help: bool,
    /// `Some(filter)` when listing recordings
    list: Option<Option<String>>,
    load: Option<PathBuf>,
    intercept: bool,
    suppress: bool,
    countdown: Option<u32>,
}

impl CliOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = CliOptions::default();
        let mut args = args.iter().peekable();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => options.help = true,
                "-l" | "--list" => {
                    let filter = args.next_if(|next| !next.starts_with('-')).cloned();
                    options.list = Some(filter);
                }
                "--load" => {
                    let path = args.next().context("--load needs a path")?;
                    options.load = Some(PathBuf::from(path));
                }
                "--intercept" => options.intercept = true,
                "--suppress" => options.suppress = true,
                "--countdown" => {
                    let value = args.next().context("--countdown needs a number of seconds")?;
                    let secs = value
                        .parse()
                        .with_context(|| format!("Invalid countdown: {:?}", value))?;
                    options.countdown = Some(secs);
                }
                other => bail!("Unknown argument: {}", other),
            }
        }

        Ok(options)
    }

    /// Apply overrides on top of the loaded configuration
    fn apply(&self, config: &mut Config) {
        if self.intercept {
            config.recording.capture_mode = CaptureMode::Intercept;
        }
        if self.suppress {
            config.recording.suppress_outgoing = true;
        }
        if let Some(secs) = self.countdown {
            config.recording.countdown_secs = secs;
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match CliOptions::parse(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {:#}", e);
            eprintln!();
            print_help();
            std::process::exit(2);
        }
    };

    if options.help {
        print_help();
        return Ok(());
    }

    let _log_guard = logging::init_logging()?;
    info!("input-recorder starting...");

    // Load configuration
    let mut config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path()?);
    options.apply(&mut config);
    config.validate()?;

    let store = TimelineStore::new(config.recordings_dir()?);

    if let Some(filter) = &options.list {
        return list_recordings(&store, filter.as_deref());
    }

    // Check permissions
    for missing in input::permissions::describe_missing_permissions(config.recording.capture_mode) {
        warn!("{} - input capture may not work", missing);
    }

    let runtime = tokio::runtime::Runtime::new()?;

    let settings = SessionSettings::from_config(&config)?;
    let (cmd_tx, cmd_rx) = create_session_channel();
    let router = Arc::new(HookRouter::new(settings.hotkeys, cmd_tx.clone()));
    let controller = SessionController::new(
        CaptureEngine::new(router),
        Arc::new(RdevSynth::new()),
        store,
        settings,
        runtime.handle().clone(),
    );

    controller
        .install_hotkeys()
        .context("Failed to install the hotkey listener")?;

    if let Some(path) = &options.load {
        let timeline = controller.load(path)?;
        info!(
            "Loaded {} events ({:.1}s) ready for playback",
            timeline.len(),
            timeline.duration_secs()
        );
    }

    // Set up Ctrl+C handler that sends shutdown command
    let ctrl_c_tx = cmd_tx.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let _ = ctrl_c_tx.send(SessionCommand::Shutdown);
    })?;

    let watcher_stop = CancellationToken::new();
    let watcher = runtime.spawn(watch_status(
        controller.clone(),
        controller.subscribe(),
        config.recording.autosave,
        watcher_stop.clone(),
    ));

    info!(
        "Ready: {} toggles recording, {} toggles playback, Ctrl+C exits",
        key_name(settings.hotkeys.record),
        key_name(settings.hotkeys.playback)
    );

    runtime.block_on(controller.run(cmd_rx));

    // Let the watcher drain anything published during shutdown
    watcher_stop.cancel();
    if let Err(e) = runtime.block_on(watcher) {
        error!("Status watcher failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Log progress and save finished recordings when autosave is on
async fn watch_status(
    controller: SessionController,
    mut status_rx: broadcast::Receiver<SessionStatus>,
    autosave: bool,
    stop: CancellationToken,
) {
    loop {
        let status = tokio::select! {
            biased;
            status = status_rx.recv() => status,
            _ = stop.cancelled() => break,
        };

        match status {
            Ok(SessionStatus::Countdown { remaining }) => {
                info!("Recording starts in {}...", remaining);
            }
            Ok(SessionStatus::RecordingFinished { event_count }) if autosave && event_count > 0 => {
                match controller.save(None) {
                    Ok(path) => info!("Autosaved recording to {:?}", path),
                    Err(e) => error!("Autosave failed: {}", e),
                }
            }
            Ok(SessionStatus::Error(message)) => error!("{}", message),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Status watcher skipped {} updates", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn list_recordings(store: &TimelineStore, filter: Option<&str>) -> Result<()> {
    let entries = store.list(filter)?;
    if entries.is_empty() {
        println!("No recordings in {}", store.dir().display());
        return Ok(());
    }

    for entry in entries {
        match store.load(&entry.path) {
            Ok(timeline) => println!(
                "{:<40} {:>6} events {:>8.1}s",
                entry.name,
                timeline.len(),
                timeline.duration_secs()
            ),
            Err(e) => println!("{:<40} unreadable: {}", entry.name, e),
        }
    }
    Ok(())
}

fn print_help() {
    println!("input-recorder - Record and replay mouse and keyboard input");
    println!();
    println!("USAGE:");
    println!("    input-recorder [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help            Print this help message");
    println!("    -l, --list [FILTER]   List saved recordings and exit");
    println!("        --load PATH       Load a recording for playback; a relative PATH is");
    println!("                          looked up in the recordings directory");
    println!("        --intercept       Capture with the intercepting hook");
    println!("        --suppress        Keep captured input from reaching other applications");
    println!("        --countdown N     Seconds to wait before recording starts (0-10)");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                  Set log level (e.g., debug, info, warn)");
    println!("    INPUT_RECORDER_LOG_PATH   Override the log directory");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        CliOptions::parse(&args)
    }

    #[test]
    fn test_parse_options() {
        let options = parse(&["--intercept", "--suppress", "--countdown", "0", "--load", "a.json"])
            .unwrap();
        assert!(options.intercept);
        assert!(options.suppress);
        assert_eq!(options.countdown, Some(0));
        assert_eq!(options.load, Some(PathBuf::from("a.json")));
        assert_eq!(options.list, None);
    }

    #[test]
    fn test_parse_list_filter_is_optional() {
        assert_eq!(parse(&["-l"]).unwrap().list, Some(None));
        assert_eq!(
            parse(&["--list", "demo"]).unwrap().list,
            Some(Some("demo".to_string()))
        );
        assert_eq!(parse(&["-l", "--intercept"]).unwrap().list, Some(None));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse(&["--countdown"]).is_err());
        assert!(parse(&["--countdown", "soon"]).is_err());
        assert!(parse(&["--load"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let mut config = Config::default();
        parse(&["--intercept", "--countdown", "5"])
            .unwrap()
            .apply(&mut config);
        assert_eq!(config.recording.capture_mode, CaptureMode::Intercept);
        assert_eq!(config.recording.countdown_secs, 5);
        assert!(!config.recording.suppress_outgoing);
    }
}
