//! Device Tuner Core - diagnostics and kernel tuning engine
//!
//! The main entry point for dt-core, handling:
//! - Root detection
//! - Static and dynamic device snapshots
//! - Tunable discovery and interactive writes
//! - Batched tuning application, including the boot path

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use dt_common::error::{format_error_human, StructuredError};
use dt_common::{Error, OutputFormat, SCHEMA_VERSION};
use dt_config::{
    resolve_settings, validate_settings, EngineSettings, SettingsPath, SettingsSnapshot,
    TunableStore, RUN_ON_BOOT, SERVICE_RUNNING,
};
use dt_core::events::{JsonlWriter, NullEmitter, ProgressEmitter, ProgressEvent};
use dt_core::exit_codes::ExitCode;
use dt_core::log_event;
use dt_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use dt_core::platform::{HostPlatform, UnavailableDrm};
use dt_core::poller::DynamicPoller;
use dt_core::probe::ProbeState;
use dt_core::props::{GetpropStore, MapPropertyStore, PropertyStore};
use dt_core::root::RootIdentity;
use dt_core::shell::SuShell;
use dt_core::snapshot::{cpu, CategoryView, DynamicSnapshot, SharedSources, StaticSnapshot};
use dt_core::sysfs::HostFs;
use dt_core::tuning::{self, TuningApplier};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Device Tuner Core - on-device diagnostics and kernel tuning
#[derive(Parser)]
#[command(name = "dt-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to settings.json
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Override the tunable store path
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Read device nodes below this directory instead of /
    #[arg(long, global = true)]
    fs_root: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect root access and the root manager
    Root,

    /// Build device snapshots
    Snapshot(SnapshotArgs),

    /// Inspect and change individual tunables
    Tunables(TunablesArgs),

    /// Apply every saved tunable in one privileged batch
    Apply(ApplyArgs),

    /// Boot entry point: apply saved tunables when run-on-boot is enabled
    Boot,

    /// Tuning service state
    Service(ServiceArgs),

    /// Persisted tunable store
    Store(StoreArgs),

    /// Engine settings
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct SnapshotArgs {
    #[command(subcommand)]
    command: SnapshotCommands,
}

#[derive(Subcommand, Debug)]
enum SnapshotCommands {
    /// Facts resolved once per session
    Static,

    /// Per-tick facts from the poll loop
    Dynamic {
        /// Number of ticks to emit
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Poll interval; defaults to the settings value
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Both snapshots grouped into display categories
    View,
}

#[derive(Args, Debug)]
struct TunablesArgs {
    #[command(subcommand)]
    command: TunablesCommands,
}

#[derive(Subcommand, Debug)]
enum TunablesCommands {
    /// Catalog entries with saved and live values
    List,

    /// Write a value now and save it
    Set { key: String, value: String },

    /// Forget a saved value
    Unset { key: String },
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Batch timeout; defaults to the settings value
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    #[command(subcommand)]
    command: ServiceCommands,
}

#[derive(Subcommand, Debug)]
enum ServiceCommands {
    /// Show the service and boot flags
    Status,
    /// Mark the service as stopped
    Stop,
}

#[derive(Args, Debug)]
struct StoreArgs {
    #[command(subcommand)]
    command: StoreCommands,
}

#[derive(Subcommand, Debug)]
enum StoreCommands {
    /// Print every stored entry
    Show,
    /// Enable or disable applying tunables at boot
    RunOnBoot {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved settings and where they came from
    Show,
    /// Print the JSON schema of the settings file
    Schema,
}

fn main() {
    let cli = Cli::parse();

    let log_format = matches!(cli.global.format, OutputFormat::Jsonl).then_some(LogFormat::Jsonl);
    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        log_format,
    );
    init_logging(&log_config);

    let exit_code = match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "dt-core", &mut std::io::stdout());
            ExitCode::Clean
        }
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
        command => match Engine::load(&cli.global) {
            Ok(engine) => dispatch(&engine, command).unwrap_or_else(|e| report_error(&cli.global, &e)),
            Err(e) => report_error(&cli.global, &e),
        },
    };

    std::process::exit(exit_code.as_i32());
}

fn dispatch(engine: &Engine, command: &Commands) -> Result<ExitCode, Error> {
    match command {
        Commands::Root => run_root(engine),
        Commands::Snapshot(args) => match &args.command {
            SnapshotCommands::Static => run_snapshot_static(engine),
            SnapshotCommands::Dynamic { count, interval_ms } => {
                run_snapshot_dynamic(engine, *count, *interval_ms)
            }
            SnapshotCommands::View => run_snapshot_view(engine),
        },
        Commands::Tunables(args) => match &args.command {
            TunablesCommands::List => run_tunables_list(engine),
            TunablesCommands::Set { key, value } => run_tunables_set(engine, key, value),
            TunablesCommands::Unset { key } => run_tunables_unset(engine, key),
        },
        Commands::Apply(args) => run_apply(engine, args.timeout_secs),
        Commands::Boot => run_boot(engine),
        Commands::Service(args) => run_service(engine, &args.command),
        Commands::Store(args) => run_store(engine, &args.command),
        Commands::Config(args) => run_config(engine, &args.command),
        Commands::Completions { .. } | Commands::Version => Ok(ExitCode::Clean),
    }
}

// ============================================================================
// Engine bootstrap
// ============================================================================

/// Resolved settings plus the fact sources built from them.
struct Engine {
    format: OutputFormat,
    settings: EngineSettings,
    resolved: SettingsPath,
    content: Option<String>,
    fs: HostFs,
    shell: Arc<SuShell>,
    sources: SharedSources,
    ctx: LogContext,
}

impl Engine {
    fn load(global: &GlobalOpts) -> Result<Self, Error> {
        let resolved = resolve_settings(global.settings.as_deref());
        let (mut settings, content) = match &resolved.path {
            Some(path) => {
                let (settings, content) = EngineSettings::load(path)?;
                (settings, Some(content))
            }
            None => {
                tracing::debug!(target: event_names::CONFIG_DEFAULT_USED, "no settings file found");
                (EngineSettings::default(), None)
            }
        };
        settings.apply_env_overrides();
        if let Some(root) = &global.fs_root {
            settings.fs_root = Some(root.clone());
        }
        if let Some(store) = &global.store {
            settings.store_path = Some(store.clone());
        }
        validate_settings(&settings)?;

        let fs = HostFs::from_optional_root(settings.fs_root.as_deref());
        let shell = Arc::new(SuShell::from_settings(&settings.shell));
        let props: Arc<dyn PropertyStore> = match &settings.props_file {
            Some(path) => Arc::new(MapPropertyStore::from_build_props(&[path])),
            None => Arc::new(GetpropStore::new()),
        };
        let platform = Arc::new(HostPlatform::new(fs.clone(), props.clone()));
        let sources = SharedSources {
            fs: Arc::new(fs.clone()),
            shell: shell.clone(),
            props: props.clone(),
            platform,
            // MediaDrm is an app-framework service; a native process has no handle to it.
            drm: Arc::new(UnavailableDrm),
        };

        let ctx = LogContext::new(generate_run_id(), props.get("ro.product.device", "local"));
        log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_LOADED,
            Stage::Init,
            "settings resolved",
            source = resolved.source.to_string()
        );

        Ok(Self {
            format: global.format,
            settings,
            resolved,
            content,
            fs,
            shell,
            sources,
            ctx,
        })
    }

    fn open_store(&self) -> Result<TunableStore, Error> {
        Ok(TunableStore::open(self.settings.effective_store_path())?)
    }

    /// One-time root detection, before anything needs it.
    fn detect_root(&self) -> RootIdentity {
        let identity = RootIdentity::detect(self.shell.as_ref(), &self.fs);
        log_event!(
            self.ctx,
            INFO,
            event_names::ROOT_DETECTED,
            Stage::Root,
            "root detected",
            rooted = identity.is_rooted,
            manager = identity.manager_name.as_str()
        );
        identity
    }

    fn require_root(&self) -> Result<RootIdentity, Error> {
        let identity = self.detect_root();
        if identity.is_rooted {
            Ok(identity)
        } else {
            Err(Error::RootDenied)
        }
    }

    fn build_static(&self, root: &RootIdentity, state: &mut ProbeState) -> StaticSnapshot {
        StaticSnapshot::build(&self.sources.borrow(), root, state)
    }

    fn batch_timeout(&self, override_secs: Option<u64>) -> Duration {
        Duration::from_secs(override_secs.unwrap_or(self.settings.tuning.batch_timeout_secs))
    }

    fn progress_emitter(&self) -> Box<dyn ProgressEmitter> {
        match self.format {
            OutputFormat::Json | OutputFormat::Jsonl => Box::new(JsonlWriter::new(std::io::stderr())),
            OutputFormat::Summary => Box::new(SummaryProgress),
        }
    }
}

/// Human progress lines on stderr.
struct SummaryProgress;

impl ProgressEmitter for SummaryProgress {
    fn emit(&self, event: ProgressEvent) {
        if event.is_terminal() {
            eprintln!("{}", event.status);
        } else {
            eprintln!("{} ({}/{})", event.status, event.step, event.total);
        }
    }
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_payload<T: Serialize>(format: OutputFormat, value: &T) -> Result<(), Error> {
    let text = match format {
        OutputFormat::Jsonl => serde_json::to_string(value)?,
        _ => serde_json::to_string_pretty(value)?,
    };
    println!("{text}");
    Ok(())
}

fn print_rows(rows: &[(&str, String)]) {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    for (label, value) in rows {
        println!("{label:<width$}  {value}");
    }
}

fn report_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    let code = ExitCode::for_error(err);
    match global.format {
        OutputFormat::Summary => {
            eprintln!("{}", format_error_human(err, std::io::stderr().is_terminal()));
        }
        format => {
            let structured = StructuredError::from(err);
            let payload = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "exit_code": code.as_i32(),
                "exit_code_name": code.code_name(),
                "error": structured,
            });
            let text = if format.is_streaming() {
                serde_json::to_string(&payload)
            } else {
                serde_json::to_string_pretty(&payload)
            };
            match text {
                Ok(text) => println!("{text}"),
                Err(_) => eprintln!("{err}"),
            }
        }
    }
    code
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Summary => {
            println!("dt-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
        _ => {
            let version_info = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "dt_core_version": env!("CARGO_PKG_VERSION"),
                "rust_version": env!("CARGO_PKG_RUST_VERSION"),
            });
            println!("{version_info:#}");
        }
    }
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_root(engine: &Engine) -> Result<ExitCode, Error> {
    let identity = engine.detect_root();
    match engine.format {
        OutputFormat::Summary => print_rows(&[
            ("Root Access", if identity.is_rooted { "Granted" } else { "None" }.to_string()),
            ("Root Manager", identity.manager_name.clone()),
        ]),
        format => print_payload(format, &identity)?,
    }
    Ok(if identity.is_rooted {
        ExitCode::Clean
    } else {
        ExitCode::CapabilityError
    })
}

fn run_snapshot_static(engine: &Engine) -> Result<ExitCode, Error> {
    let root = engine.detect_root();
    let mut state = ProbeState::new();
    let snapshot = engine.build_static(&root, &mut state);
    log_event!(
        engine.ctx,
        INFO,
        event_names::SNAPSHOT_BUILT,
        Stage::StaticSnapshot,
        "static snapshot built",
        denied = state.denied_count()
    );
    match engine.format {
        OutputFormat::Summary => {
            print_rows(&[
                ("Device", snapshot.identity.device_name.clone()),
                ("Android", snapshot.identity.android_version.clone()),
                ("Kernel", snapshot.system.kernel_version.clone()),
                ("Cores", snapshot.hardware.core_count.to_string()),
                ("Virtual A/B", snapshot.system.partitions.virtual_ab_status.label().to_string()),
                ("Root Manager", snapshot.root.manager_name.clone()),
            ]);
        }
        format => print_payload(format, &snapshot)?,
    }
    Ok(ExitCode::Clean)
}

fn run_snapshot_dynamic(engine: &Engine, count: u32, interval_ms: Option<u64>) -> Result<ExitCode, Error> {
    let interval = Duration::from_millis(interval_ms.unwrap_or(engine.settings.poll.interval_ms));
    let cores = cpu::core_count(&engine.fs);
    let (poller, ticks) = DynamicPoller::start(engine.sources.clone(), cores, interval)?;

    let mut collected: Vec<Arc<DynamicSnapshot>> = Vec::new();
    for snapshot in ticks.iter().take(count.max(1) as usize) {
        match engine.format {
            OutputFormat::Jsonl => print_payload(OutputFormat::Jsonl, snapshot.as_ref())?,
            OutputFormat::Summary => println!(
                "{}  cpu {} {}  battery {} {} mA  ip {}",
                snapshot.stamp.generated_at.format("%H:%M:%S"),
                snapshot.cpu.governor,
                snapshot
                    .cpu
                    .temperature_c
                    .map(|t| format!("{t:.1}°C"))
                    .unwrap_or_else(|| "-".to_string()),
                snapshot.battery.status,
                snapshot.battery.current_ma,
                snapshot.connectivity.ipv4,
            ),
            OutputFormat::Json => collected.push(snapshot),
        }
    }
    drop(ticks);
    if let Some(state) = poller.stop() {
        log_event!(
            engine.ctx,
            DEBUG,
            event_names::POLL_STOPPED,
            Stage::Poll,
            "poll finished",
            ticks = state.tick_count,
            denied = state.probe.denied_count()
        );
    }

    if engine.format == OutputFormat::Json {
        match collected.as_slice() {
            [single] => print_payload(OutputFormat::Json, single.as_ref())?,
            many => {
                let all: Vec<&DynamicSnapshot> = many.iter().map(Arc::as_ref).collect();
                print_payload(OutputFormat::Json, &all)?
            }
        }
    }
    Ok(ExitCode::Clean)
}

fn run_snapshot_view(engine: &Engine) -> Result<ExitCode, Error> {
    let root = engine.detect_root();
    let mut state = ProbeState::new();
    let static_snapshot = engine.build_static(&root, &mut state);
    let dynamic = DynamicSnapshot::build(
        &engine.sources.borrow(),
        static_snapshot.hardware.core_count,
        &mut state,
    );
    let views = CategoryView::render(&static_snapshot, &dynamic);

    match engine.format {
        OutputFormat::Summary => {
            for view in &views {
                println!("== {} ==", view.title);
                let rows: Vec<(&str, String)> =
                    view.rows.iter().map(|r| (r.label, r.value.clone())).collect();
                print_rows(&rows);
                println!();
            }
        }
        format => print_payload(format, &views)?,
    }
    Ok(ExitCode::Clean)
}

fn run_tunables_list(engine: &Engine) -> Result<ExitCode, Error> {
    let store = engine.open_store()?;
    let mut state = ProbeState::new();
    let statuses = tuning::probe_tunables(&mut state, &engine.fs, engine.shell.as_ref(), &store);

    match engine.format {
        OutputFormat::Summary => {
            let rows: Vec<(&str, String)> = statuses
                .iter()
                .map(|s| {
                    let live = s
                        .live
                        .as_ref()
                        .map(|p| format!("{} ({})", p.value, p.path))
                        .unwrap_or_else(|| "unavailable".to_string());
                    let saved = s.saved.as_deref().unwrap_or("-");
                    (s.key, format!("saved={saved}  live={live}"))
                })
                .collect();
            print_rows(&rows);
        }
        format => print_payload(format, &statuses)?,
    }
    Ok(ExitCode::Clean)
}

fn run_tunables_set(engine: &Engine, key: &str, value: &str) -> Result<ExitCode, Error> {
    engine.require_root()?;
    let mut store = engine.open_store()?;
    let outcome = tuning::set_tunable(engine.shell.as_ref(), &engine.fs, &mut store, key, value)?;
    log_event!(
        engine.ctx,
        INFO,
        event_names::STORE_SAVED,
        Stage::Store,
        "tunable written",
        key = outcome.key,
        written = outcome.written.len()
    );
    match engine.format {
        OutputFormat::Summary => println!("{} = {} ({} node(s))", outcome.key, outcome.value, outcome.written.len()),
        format => print_payload(format, &outcome)?,
    }
    Ok(ExitCode::Clean)
}

fn run_tunables_unset(engine: &Engine, key: &str) -> Result<ExitCode, Error> {
    let mut store = engine.open_store()?;
    let removed = tuning::unset_tunable(&mut store, key)?;
    match engine.format {
        OutputFormat::Summary => println!("{key}: {}", if removed { "removed" } else { "not set" }),
        format => print_payload(format, &serde_json::json!({ "key": key, "removed": removed }))?,
    }
    Ok(ExitCode::Clean)
}

fn apply_saved(engine: &Engine, emitter: &dyn ProgressEmitter, timeout: Duration) -> Result<tuning::ApplyReport, Error> {
    engine.require_root()?;
    let mut store = engine.open_store()?;
    log_event!(
        engine.ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Apply,
        "applying saved tunables",
        store = store.path().display().to_string()
    );
    let report = TuningApplier::new(engine.shell.as_ref(), &engine.fs, emitter)
        .with_timeout(timeout)
        .run(&mut store);
    log_event!(
        engine.ctx,
        INFO,
        event_names::RUN_FINISHED,
        Stage::Apply,
        "apply finished",
        total = report.total,
        elapsed_ms = report.elapsed_ms
    );
    Ok(report)
}

fn applied_code(report: &tuning::ApplyReport) -> ExitCode {
    if report.total == 0 {
        ExitCode::Clean
    } else {
        ExitCode::TuningApplied
    }
}

fn run_apply(engine: &Engine, timeout_secs: Option<u64>) -> Result<ExitCode, Error> {
    let emitter = engine.progress_emitter();
    let report = apply_saved(engine, emitter.as_ref(), engine.batch_timeout(timeout_secs))?;
    match engine.format {
        OutputFormat::Summary => println!("{} tunable write(s): {}", report.total, report.status),
        format => print_payload(format, &report)?,
    }
    Ok(applied_code(&report))
}

fn run_boot(engine: &Engine) -> Result<ExitCode, Error> {
    let store = engine.open_store()?;
    if !store.get_bool(RUN_ON_BOOT, false) {
        log_event!(engine.ctx, INFO, event_names::RUN_FINISHED, Stage::Init, "run on boot disabled");
        if engine.format != OutputFormat::Summary {
            print_payload(engine.format, &serde_json::json!({ "ran": false }))?;
        }
        return Ok(ExitCode::Clean);
    }
    drop(store);

    let report = apply_saved(engine, &NullEmitter, engine.batch_timeout(None))?;
    if engine.format != OutputFormat::Summary {
        print_payload(engine.format, &serde_json::json!({ "ran": true, "report": report }))?;
    }
    Ok(applied_code(&report))
}

fn run_service(engine: &Engine, command: &ServiceCommands) -> Result<ExitCode, Error> {
    let mut store = engine.open_store()?;
    if let ServiceCommands::Stop = command {
        store.set_bool(SERVICE_RUNNING, false);
        store.save()?;
    }
    let running = store.get_bool(SERVICE_RUNNING, false);
    let on_boot = store.get_bool(RUN_ON_BOOT, false);
    match engine.format {
        OutputFormat::Summary => print_rows(&[
            ("Service running", running.to_string()),
            ("Run on boot", on_boot.to_string()),
        ]),
        format => print_payload(
            format,
            &serde_json::json!({ "service_running": running, "run_on_boot": on_boot }),
        )?,
    }
    Ok(ExitCode::Clean)
}

fn run_store(engine: &Engine, command: &StoreCommands) -> Result<ExitCode, Error> {
    let mut store = engine.open_store()?;
    if let StoreCommands::RunOnBoot { state } = command {
        store.set_bool(RUN_ON_BOOT, matches!(state, Toggle::On));
        store.save()?;
        log_event!(
            engine.ctx,
            INFO,
            event_names::STORE_SAVED,
            Stage::Store,
            "run on boot updated",
            enabled = matches!(state, Toggle::On)
        );
    }

    match engine.format {
        OutputFormat::Summary => {
            let rows: Vec<(&str, String)> = store
                .entries()
                .iter()
                .map(|(k, v)| (k.as_str(), serde_json::to_string(v).unwrap_or_default()))
                .collect();
            print_rows(&rows);
        }
        format => print_payload(
            format,
            &serde_json::json!({
                "path": store.path().display().to_string(),
                "namespace": store.namespace(),
                "content_hash": store.content_hash(),
                "entries": store.entries(),
            }),
        )?,
    }
    Ok(ExitCode::Clean)
}

fn run_config(engine: &Engine, command: &ConfigCommands) -> Result<ExitCode, Error> {
    match command {
        ConfigCommands::Show => {
            let snapshot = SettingsSnapshot::new(&engine.settings, &engine.resolved, engine.content.as_deref());
            match engine.format {
                OutputFormat::Summary => print_rows(&[
                    ("Source", snapshot.source.clone()),
                    ("Path", snapshot.path.clone().unwrap_or_else(|| "-".to_string())),
                    ("Shell", engine.settings.shell.binary.clone()),
                    ("Store", engine.settings.effective_store_path().display().to_string()),
                ]),
                format => print_payload(format, &snapshot)?,
            }
        }
        ConfigCommands::Schema => {
            let schema = schemars::schema_for!(EngineSettings);
            print_payload(engine.format, &schema)?;
        }
    }
    Ok(ExitCode::Clean)
}
