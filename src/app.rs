//! Application orchestrator.
//! Loads config, applies CLI overrides, initializes logging, installs the
//! Ctrl-C handler, builds the engine for the configured mode and dispatches
//! the subcommand.

use anyhow::{Context, Result, anyhow};
use clap::CommandFactory;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use junction_mover::advisory::{Advisor, OfflineAdvisor};
use junction_mover::bridge::{InProcessElevator, SimulatedElevator};
use junction_mover::cli::{Args, Command, sanitize_path};
use junction_mover::config::{CONFIG_ENV, LoadResult, load_or_init};
use junction_mover::output as out;
use junction_mover::script::{render_posix, render_powershell};
use junction_mover::{
    Config, ExecutionMode, FolderDescriptor, JobObserver, MoveStep, NativeInspector, NativeVolume,
    Progress, RelocationEngine, Severity, default_config_path, discover, shutdown,
};

use crate::logging::init_tracing;

/// Prints job events as they arrive and mirrors them into the log.
struct ConsoleObserver;

impl JobObserver for ConsoleObserver {
    fn on_step(&self, step: MoveStep) {
        info!(target: "junction_mover::job", step = %step, "step");
        out::print_step(step);
    }

    fn on_progress(&self, progress: &Progress) {
        debug!(
            target: "junction_mover::job",
            files = progress.files_copied,
            bytes = progress.bytes_copied,
            current = %progress.current_file,
            "progress"
        );
        out::print_progress(progress);
    }

    fn on_log(&self, message: &str, severity: Severity) {
        info!(target: "junction_mover::job", severity = %severity, "{message}");
        out::print_severity(message, severity);
    }
}

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // Handle --print-config before logging init
    if args.print_config {
        print_config_location();
        return Ok(());
    }

    let mut cfg = match load_or_init()? {
        LoadResult::Loaded { config, path } => {
            debug!(path = %path.display(), "using config file");
            config
        }
        LoadResult::CreatedTemplate(path) => {
            out::print_success(&format!(
                "A template junction_mover config was written to: {}",
                path.display()
            ));
            out::print_info(&format!(
                "Set <target_root> there to choose where relocated folders go. To use a different location set {CONFIG_ENV}."
            ));
            Config::default()
        }
        LoadResult::Defaults => Config::default(),
    };
    args.apply_overrides(&mut cfg);
    cfg.validate()?;

    // Initialize logging and capture the guard so we can drop it on signal
    let guard_opt = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {}", e));
        e
    })?;

    let guard_slot = Arc::new(Mutex::new(guard_opt));
    {
        let guard_slot = Arc::clone(&guard_slot);
        let installed = ctrlc::set_handler(move || {
            shutdown::request();
            out::print_warn("Received interrupt; stopping after the current unit of work...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        });
        if let Err(e) = installed {
            warn!(error = %e, "could not install Ctrl-C handler");
        }
    }

    debug!("Starting junction_mover: {:?}", args);
    let result = dispatch(&args, &cfg);

    if let Err(e) = &result {
        if let Some(re) = e.downcast_ref::<junction_mover::RelocateError>() {
            error!(code = re.code(), kind = re.kind(), precondition = re.is_precondition(), "{re}");
        } else {
            error!(error = ?e, "command failed");
        }
    }

    // Ensure logs are flushed before exit
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}

fn print_config_location() {
    if let Ok(cfg_env) = std::env::var(CONFIG_ENV) {
        out::print_info(&format!("Using {CONFIG_ENV} (explicit):\n  {}\n", cfg_env));
        out::print_info(&format!("To override, unset {CONFIG_ENV} or set it to another file."));
        return;
    }
    match default_config_path() {
        Ok(p) => {
            out::print_info(&format!("Default junction_mover config path:\n  {}\n", p.display()));
            if p.exists() {
                out::print_info("A config file already exists at that location.");
            } else {
                out::print_info("No config file exists there yet. Run without --print-config to create a template.");
            }
        }
        Err(e) => out::print_error(&format!("Could not determine a default config path: {e}")),
    }
}

fn build_engine(cfg: &Config) -> RelocationEngine {
    let engine = match cfg.mode {
        ExecutionMode::Native => RelocationEngine::new(native_elevator(cfg)),
        ExecutionMode::Direct => RelocationEngine::new(Box::new(InProcessElevator)),
        ExecutionMode::Simulated => RelocationEngine::new(Box::new(SimulatedElevator::default())),
    };
    let engine = engine
        .with_checker(cfg.safety_checker())
        .with_poll_interval(cfg.poll_interval);
    info!(mode = %cfg.mode, bridge = engine.elevator_name(), "engine ready");
    engine
}

#[cfg(windows)]
fn native_elevator(_cfg: &Config) -> Box<dyn junction_mover::bridge::Elevator> {
    Box::new(junction_mover::bridge::PowerShellElevator::new(
        junction_mover::platform::is_elevated(),
    ))
}

#[cfg(not(windows))]
fn native_elevator(cfg: &Config) -> Box<dyn junction_mover::bridge::Elevator> {
    // Already root: no prompt needed.
    let prefix = if junction_mover::platform::is_elevated() {
        Vec::new()
    } else {
        cfg.elevation_command.clone()
    };
    Box::new(junction_mover::bridge::ShellElevator::new(prefix))
}

fn dispatch(args: &Args, cfg: &Config) -> Result<()> {
    let Some(command) = &args.command else {
        Args::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Command::Scan { sizes, .. } => scan(cfg, *sizes, args.json),
        Command::Inspect { path } => inspect(cfg, &sanitize_path(path), args.json),
        Command::Relocate { path, yes, .. } => relocate(cfg, &sanitize_path(path), *yes),
        Command::Restore { path, yes } => restore(cfg, &sanitize_path(path), *yes),
        Command::Plan { path, restore, .. } => plan(cfg, &sanitize_path(path), *restore),
    }
}

fn scan(cfg: &Config, sizes: bool, json: bool) -> Result<()> {
    let root = cfg
        .scan_root
        .as_deref()
        .ok_or_else(|| anyhow!("no scan root: pass one to `scan` or set <scan_root> in the config"))?;
    let mut folders = discover(root, cfg.scan_limit, &NativeInspector)
        .with_context(|| format!("scan {}", root.display()))?;

    if sizes {
        for folder in &mut folders {
            if shutdown::is_requested() {
                break;
            }
            if let Err(e) = folder.measure(&NativeVolume, cfg.size_scan_timeout) {
                warn!(path = %folder.source_path.display(), error = %e, "size unavailable");
            }
        }
    }

    if json {
        out::print_user(&serde_json::to_string_pretty(&folders)?);
        return Ok(());
    }
    if folders.is_empty() {
        out::print_info(&format!("No folders found under {}", root.display()));
        return Ok(());
    }
    for f in &folders {
        let link = match &f.link_target {
            Some(t) => format!("-> {}", t.display()),
            None => String::new(),
        };
        out::print_user(&format!("{:<40} {:>12}  {}", f.name, f.size_label, link));
    }
    Ok(())
}

fn describe_path(engine: &RelocationEngine, path: &Path) -> Result<FolderDescriptor> {
    let info = engine.inspect(path)?;
    let mut folder = FolderDescriptor::from_path(path);
    folder.is_junction = info.is_junction;
    folder.link_target = info.target;
    Ok(folder)
}

fn inspect(cfg: &Config, path: &Path, json: bool) -> Result<()> {
    let engine = build_engine(cfg);
    let folder = describe_path(&engine, path)?;
    if json {
        out::print_user(&serde_json::to_string_pretty(&folder)?);
    } else if let Some(target) = &folder.link_target {
        out::print_user(&format!("{} is a junction -> {}", path.display(), target.display()));
    } else {
        out::print_user(&format!("{} is not a junction", path.display()));
    }
    Ok(())
}

fn relocate(cfg: &Config, path: &Path, yes: bool) -> Result<()> {
    let target_root = cfg
        .target_root
        .as_deref()
        .ok_or_else(|| anyhow!("no target root: pass --target or set <target_root> in the config"))?;
    let engine = build_engine(cfg);
    let mut folder = describe_path(&engine, path)?;

    let advice = OfflineAdvisor.advise(&folder.name, &folder.source_path);
    out::print_info(&format!("Risk: {}. {}", advice.risk_level, advice.reason));
    out::print_info(&advice.recommended_action);

    let dest = folder.destination_under(target_root);
    if !confirm(
        &format!("Move {} to {} and leave a junction behind?", path.display(), dest.display()),
        yes,
    )? {
        out::print_info("Cancelled.");
        return Ok(());
    }

    let result = engine.relocate(&mut folder, target_root, cfg.relocate_options(), &ConsoleObserver);
    report(result)
}

fn restore(cfg: &Config, path: &Path, yes: bool) -> Result<()> {
    let engine = build_engine(cfg);
    let mut folder = describe_path(&engine, path)?;
    let from = folder
        .link_target
        .as_ref()
        .map(|t| t.display().to_string())
        .unwrap_or_else(|| "<not a junction>".into());
    if !confirm(
        &format!("Remove the junction at {} and move the data back from {}?", path.display(), from),
        yes,
    )? {
        out::print_info("Cancelled.");
        return Ok(());
    }

    let result = engine.restore(&mut folder, &ConsoleObserver);
    report(result)
}

fn report(result: junction_mover::RelocationResult) -> Result<()> {
    let files = result.files_copied;
    result.into_result()?;
    out::print_success(&format!("Done ({files} files reported by the transfer log)."));
    Ok(())
}

fn plan(cfg: &Config, path: &Path, restore: bool) -> Result<()> {
    let engine = build_engine(cfg);
    let folder = describe_path(&engine, path)?;
    let script = if restore {
        engine.plan_restore(&folder)?.0
    } else {
        let target_root = cfg
            .target_root
            .as_deref()
            .ok_or_else(|| anyhow!("no target root: pass --target or set <target_root> in the config"))?;
        engine.plan_relocate(&folder, target_root, cfg.relocate_options())?
    };

    out::print_info("Privileged commands:");
    for line in script.describe() {
        out::print_command(&line);
    }
    let rendered = if cfg!(windows) {
        render_powershell(&script)
    } else {
        render_posix(&script)
    };
    out::print_info("Script:");
    out::print_user(&rendered);
    Ok(())
}

/// Ask a y/N question on stdin. Non-interactive sessions must pass `--yes`.
fn confirm(question: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if !atty::is(atty::Stream::Stdin) {
        return Err(anyhow!("refusing to proceed without confirmation; pass --yes"));
    }
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
