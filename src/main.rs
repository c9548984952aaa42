use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use precision_clicker::config::{parse_duration, ClickerSettings};
use precision_clicker::{
    ClickKind, HotkeyEvent, HotkeyListener, HotkeyManager, InjectionPort, Mode, NoopPort, Point,
    PositionPolicy, RunController, StatusEvent, StopOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "pclick", version, about = "Low-jitter auto clicker")]
struct Cli {
    /// Load settings from a JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective settings to this JSON file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Clicks per second in rapid mode (1-10000)
    #[arg(long)]
    cps: Option<u32>,

    /// Delay between clicks in interval mode, e.g. "2s" or "500ms"
    #[arg(long, value_parser = parse_interval)]
    interval: Option<Duration>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// left, right, middle or double
    #[arg(short, long)]
    button: Option<ClickKind>,

    /// Lock clicks to the pointer position sampled at start
    #[arg(long, conflicts_with = "at")]
    lock_position: bool,

    /// Always click at "X,Y"
    #[arg(long)]
    at: Option<Point>,

    /// Toggle hotkey, e.g. "f6" or "ctrl+alt+c"
    #[arg(long)]
    hotkey: Option<String>,

    /// Do not register a global hotkey
    #[arg(long)]
    no_hotkey: bool,

    /// Start clicking immediately
    #[arg(long)]
    start: bool,

    /// Stop after this long and exit, e.g. "30s"
    #[arg(long, value_parser = parse_interval)]
    duration: Option<Duration>,

    /// Perform one test click and exit
    #[arg(long)]
    test_click: bool,

    /// Log clicks instead of injecting them
    #[arg(long)]
    dry_run: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Rapid,
    Interval,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Rapid => Mode::Rapid,
            ModeArg::Interval => Mode::Interval,
        }
    }
}

fn parse_interval(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "precision_clicker=debug,pclick=debug"
    } else {
        "precision_clicker=info,pclick=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .try_init();
}

fn effective_settings(cli: &Cli) -> Result<ClickerSettings> {
    let mut settings = match &cli.config {
        Some(path) => ClickerSettings::from_file(path)?,
        None => ClickerSettings::default(),
    };

    if let Some(cps) = cli.cps {
        settings.clicks_per_second = cps;
    }
    if let Some(interval) = cli.interval {
        settings.interval_delay = interval;
    }
    if let Some(mode) = cli.mode {
        settings.mode = mode.into();
    }
    if let Some(kind) = cli.button {
        settings.click_kind = kind;
    }
    if cli.lock_position {
        settings.position_policy = PositionPolicy::LockOnStart;
    }
    if let Some(point) = cli.at {
        settings.position_policy = PositionPolicy::Fixed(point);
    }
    if let Some(hotkey) = &cli.hotkey {
        settings.toggle_hotkey = hotkey.clone();
    }

    let settings = settings.normalized();
    settings.validate()?;
    Ok(settings)
}

fn injection_port(dry_run: bool) -> Result<Arc<dyn InjectionPort>> {
    if dry_run {
        return Ok(Arc::new(NoopPort::default()));
    }

    #[cfg(feature = "native-input")]
    {
        use anyhow::Context as _;
        let port = precision_clicker::EnigoPort::new().context("input backend unavailable")?;
        Ok(Arc::new(port))
    }

    #[cfg(not(feature = "native-input"))]
    {
        warn!("built without native-input; clicks are only logged");
        Ok(Arc::new(NoopPort::default()))
    }
}

fn print_banner(settings: &ClickerSettings, hotkey: Option<&str>) {
    println!("{}", "Precision Clicker".bold().cyan());
    match settings.mode {
        Mode::Rapid => println!("  mode:     rapid @ {} cps", settings.clicks_per_second),
        Mode::Interval => println!(
            "  mode:     interval every {:.3}s",
            settings.interval_delay.as_secs_f64()
        ),
    }
    println!("  button:   {}", settings.click_kind);
    let position = match settings.position_policy {
        PositionPolicy::FollowPointer => "follow pointer".to_string(),
        PositionPolicy::LockOnStart => "lock at start".to_string(),
        PositionPolicy::Fixed(point) => format!("fixed at {point}"),
    };
    println!("  position: {position}");
    match hotkey {
        Some(hotkey) => println!("  toggle:   {}", hotkey.yellow()),
        None => println!("  toggle:   {}", "none".dimmed()),
    }
    println!("  Press Ctrl+C to quit.");
}

fn print_status(event: &StatusEvent) {
    match event {
        StatusEvent::Started => println!("\n{}", "▶ clicking".green().bold()),
        StatusEvent::Stopped => println!("\n{}", "■ stopped".red().bold()),
        StatusEvent::ClickCountChanged(count) => {
            print!("\r  clicks: {}", count.to_string().bold());
            let _ = std::io::stdout().flush();
        }
        StatusEvent::InjectionFailed(reason) => {
            eprintln!("\n{} {}", "click failed:".red(), reason);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = effective_settings(&cli)?;

    if let Some(path) = &cli.save_config {
        settings.save_to_file(path)?;
        println!("Saved settings to {}", path.display());
        return Ok(());
    }

    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<StatusEvent>();
    let port = injection_port(cli.dry_run)?;
    let mut controller = RunController::with_settings(&settings, port, Arc::new(status_tx))?;

    if cli.test_click {
        let point = controller.perform_test_click()?;
        println!("Test click ({}) at {}", settings.click_kind, point);
        return Ok(());
    }

    let (hotkey_tx, mut hotkey_rx) = mpsc::unbounded_channel::<HotkeyEvent>();
    let mut hotkeys = None;
    if !cli.no_hotkey {
        match HotkeyManager::new().and_then(|mut manager| {
            manager.register_toggle_hotkey(&settings.toggle_hotkey)?;
            Ok(manager)
        }) {
            Ok(manager) => {
                let _listener = manager.listen(hotkey_tx.clone());
                hotkeys = Some(manager);
            }
            Err(e) => warn!(error = %e, "global hotkey unavailable"),
        }
    }
    // Keeps the channel open when no listener holds a sender.
    let _hotkey_tx = hotkey_tx;

    print_banner(
        &settings,
        hotkeys.as_ref().and_then(HotkeyManager::current_hotkey),
    );

    if cli.start {
        controller.start()?;
    }

    let deadline = cli.duration.map(|d| Instant::now() + d);
    let run_deadline = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(run_deadline);

    loop {
        tokio::select! {
            Some(HotkeyEvent::Activated) = hotkey_rx.recv() => {
                if let Err(e) = tokio::task::block_in_place(|| controller.toggle()) {
                    warn!(error = %e, "failed to start clicking");
                }
            }
            Some(event) = status_rx.recv() => print_status(&event),
            _ = &mut run_deadline => {
                info!("run duration elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                break;
            }
        }
    }

    if tokio::task::block_in_place(|| controller.stop()) == StopOutcome::TimedOut {
        warn!("click thread was detached during shutdown");
    }
    while let Ok(event) = status_rx.try_recv() {
        print_status(&event);
    }
    println!("Total clicks: {}", controller.click_count());
    Ok(())
}
