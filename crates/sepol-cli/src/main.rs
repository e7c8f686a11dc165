use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sepol_audit::{verify_journal, ChangeJournal, JournalCheck};
use sepol_config::{
    load_layered_yaml, report_unused_keys, EngineConfig, HostSection, LoadedConfig,
    UnusedKeyPolicy,
};
use sepol_reconcile::{
    DesiredState, FcontextSpec, FileType, ModuleSpec, PortPolicySpec, ReconcileContext,
    Reconciler, Toggle,
};
use sepol_semanage::{SemanageHost, ToolPaths};
use tracing::{info, warn};
use uuid::Uuid;

/// Exit code for a reconcile that ended in `result: false`.
const EXIT_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "sepol")]
#[command(about = "Declarative SELinux reconciliation", long_about = None)]
struct Cli {
    /// Config layer, repeatable. Later layers override earlier ones.
    #[arg(long = "config", global = true)]
    config: Vec<String>,

    /// Report what would change without changing anything.
    #[arg(long = "test", global = true)]
    test: bool,

    /// Append the outcome to this change journal (overrides audit.path).
    #[arg(long, global = true)]
    journal: Option<PathBuf>,

    /// Correlation id for this run. A random one is used when omitted.
    #[arg(long, global = true)]
    run_id: Option<Uuid>,

    /// Refuse to run when the config has keys nothing reads.
    #[arg(long, global = true)]
    strict_config: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge the enforcement mode (Enforcing or Permissive).
    Mode { mode: String },

    /// Converge an SELinux boolean.
    Boolean {
        name: String,

        /// on/off, true/false, 1/0 or yes/no.
        #[arg(value_parser = parse_toggle)]
        value: Option<bool>,

        /// Compare and write the boot default as well as the live value.
        #[arg(long)]
        persist: bool,
    },

    /// Port policy records.
    Port {
        #[command(subcommand)]
        cmd: PortCmd,
    },

    /// File-context rules and file labels.
    Fcontext {
        #[command(subcommand)]
        cmd: FcontextCmd,
    },

    /// Enable or disable a policy module.
    Module {
        name: String,
        /// enabled or disabled.
        state: String,
        /// Required installed version.
        #[arg(long)]
        version: Option<String>,
    },

    /// Load layered config and print canonical JSON + hash.
    ConfigHash {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Change journal utilities.
    Journal {
        #[command(subcommand)]
        cmd: JournalCmd,
    },
}

#[derive(Subcommand)]
enum PortCmd {
    /// Ensure the port is labeled with the given type.
    Present(PortArgs),
    /// Ensure no local record exists for the port.
    Absent(PortArgs),
}

#[derive(Args)]
struct PortArgs {
    /// `<protocol>/<port>` (e.g. tcp/8080) unless --protocol and --port are given.
    name: String,
    #[arg(long)]
    sel_type: Option<String>,
    #[arg(long)]
    protocol: Option<String>,
    /// Single port or `low-high` range.
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    sel_range: Option<String>,
}

impl PortArgs {
    fn into_spec(self) -> PortPolicySpec {
        PortPolicySpec {
            name: self.name,
            sel_type: self.sel_type,
            protocol: self.protocol,
            port: self.port,
            sel_range: self.sel_range,
        }
    }
}

#[derive(Subcommand)]
enum FcontextCmd {
    /// Ensure a file-context rule exists with the given type.
    Present(FcontextArgs),
    /// Ensure no matching local rule exists.
    Absent(FcontextArgs),
    /// Relabel files so they match the current rules.
    Applied {
        filespec: String,
        #[arg(long)]
        recursive: bool,
    },
}

#[derive(Args)]
struct FcontextArgs {
    filespec: String,
    /// Letter id (a, f, d, ...) or description ("regular file").
    #[arg(long, default_value = "a", value_parser = parse_filetype)]
    filetype: FileType,
    #[arg(long)]
    sel_type: Option<String>,
    #[arg(long)]
    sel_user: Option<String>,
    #[arg(long)]
    sel_level: Option<String>,
}

impl FcontextArgs {
    fn into_spec(self) -> FcontextSpec {
        FcontextSpec {
            filespec: self.filespec,
            filetype: self.filetype,
            sel_type: self.sel_type,
            sel_user: self.sel_user,
            sel_level: self.sel_level,
        }
    }
}

#[derive(Subcommand)]
enum JournalCmd {
    /// Check sequence continuity and the hash chain of a journal file.
    Verify { path: PathBuf },
}

fn parse_toggle(raw: &str) -> Result<bool, String> {
    Toggle::parse(raw)
        .map(|t| t.as_bool())
        .ok_or_else(|| format!("{raw:?} is not a boolean value (on/off, true/false, 1/0, yes/no)"))
}

fn parse_filetype(raw: &str) -> Result<FileType, String> {
    FileType::from_id(raw)
        .or_else(|| FileType::from_description(raw))
        .ok_or_else(|| format!("{raw:?} is not a file type"))
}

fn main() -> Result<ExitCode> {
    // Optional local overrides (RUST_LOG etc); missing file is fine.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    let config_refs: Vec<&str> = cli.config.iter().map(|s| s.as_str()).collect();
    let loaded = if config_refs.is_empty() {
        LoadedConfig::empty()?
    } else {
        load_layered_yaml(&config_refs)?
    };
    let cfg = loaded.engine()?;
    init_tracing(cfg.logging.filter.as_deref());

    let policy = if cli.strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(&loaded.config_json, policy)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has keys nothing reads");
    }

    let desired = match cli.cmd {
        Commands::ConfigHash { paths } => {
            let refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Journal {
            cmd: JournalCmd::Verify { path },
        } => return journal_verify(&path),
        Commands::Mode { mode } => DesiredState::Mode { mode },
        Commands::Boolean {
            name,
            value,
            persist,
        } => DesiredState::Boolean {
            name,
            value,
            persist,
        },
        Commands::Port { cmd } => match cmd {
            PortCmd::Present(args) => DesiredState::PortPolicyPresent(args.into_spec()),
            PortCmd::Absent(args) => DesiredState::PortPolicyAbsent(args.into_spec()),
        },
        Commands::Fcontext { cmd } => match cmd {
            FcontextCmd::Present(args) => DesiredState::FcontextPresent(args.into_spec()),
            FcontextCmd::Absent(args) => DesiredState::FcontextAbsent(args.into_spec()),
            FcontextCmd::Applied {
                filespec,
                recursive,
            } => DesiredState::FcontextApplied {
                filespec,
                recursive,
            },
        },
        Commands::Module {
            name,
            state,
            version,
        } => DesiredState::Module(ModuleSpec {
            name,
            state,
            version,
        }),
    };

    let journal = cli.journal.or_else(|| cfg.audit.path.clone());
    run_reconcile(&cfg, &loaded, desired, cli.test, cli.run_id, journal)
}

fn run_reconcile(
    cfg: &EngineConfig,
    loaded: &LoadedConfig,
    desired: DesiredState,
    test: bool,
    run_id: Option<Uuid>,
    journal_path: Option<PathBuf>,
) -> Result<ExitCode> {
    let mut ctx = ReconcileContext::new(test || cfg.engine.simulate_only);
    if let Some(id) = run_id {
        ctx = ctx.with_run_id(id);
    }

    info!(
        run_id = %ctx.run_id(),
        kind = %desired.kind(),
        name = desired.identity(),
        simulate_only = ctx.simulate_only(),
        config_hash = %loaded.config_hash,
        "reconcile start"
    );

    let host = SemanageHost::system(tool_paths(&cfg.host)?);
    let outcome = Reconciler::new(&host).reconcile(&ctx, &desired);

    if let Some(path) = journal_path {
        let mut journal = ChangeJournal::open(&path, cfg.audit.hash_chain)?;
        let entry = journal.record_outcome(&ctx, &outcome)?;
        info!(seq = entry.seq, path = %path.display(), "outcome journaled");
    }

    let record = outcome.record();
    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("serialize outcome failed")?
    );

    Ok(match record.result {
        Some(false) => ExitCode::from(EXIT_FAILED),
        _ => ExitCode::SUCCESS,
    })
}

fn journal_verify(path: &Path) -> Result<ExitCode> {
    match verify_journal(path)? {
        JournalCheck::Intact { entries } => {
            println!("journal_intact=true entries={entries}");
            Ok(ExitCode::SUCCESS)
        }
        JournalCheck::Broken { line, reason } => {
            println!("journal_intact=false line={line}");
            println!("reason={reason}");
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn tool_paths(host: &HostSection) -> Result<ToolPaths> {
    let mut paths = ToolPaths::default();
    for (tool, path) in &host.tools {
        if !paths.set(tool, path) {
            bail!("unknown tool {tool:?} under host.tools");
        }
    }
    if let Some(cfg) = &host.selinux_config {
        paths = paths.with_selinux_config(cfg);
    }
    Ok(paths)
}

fn init_tracing(config_filter: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config_filter.unwrap_or("info").into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
