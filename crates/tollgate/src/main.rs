#![forbid(unsafe_code)]

use std::io::{self, Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use tollgate_core::baseline::DEFAULT_KEY;
use tollgate_core::config::{config_path, state_dir, TollgateConfig, CONFIG_ENV};
use tollgate_core::decision::Decision;
use tollgate_core::event::{self, ExecutionEvent};
use tollgate_core::types::{Domain, GateKind, HookPhase, Platform, ToolKind};
use tollgate_engine::baseline::{BaselineStore, FsBackend};
use tollgate_engine::emit::emit;
use tollgate_engine::state::atomic::atomic_write;
use tollgate_engine::state::audit_log::{decisions_path, verify_chain};
use tollgate_engine::state::history::{history_path, read_history, verify_history};
use tollgate_engine::Pipeline;

const LOG_ENV: &str = "TOLLGATE_LOG";

#[derive(Parser)]
#[command(
    name = "tollgate",
    version,
    about = "Quality gates for agent tool calls. Fails open on anything but a measured violation."
)]
struct Cli {
    /// Project root holding .tollgate/ (default: current directory; for
    /// `hook`, the event's working directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Evaluate one hook event from stdin and answer the host on stdout.
    Hook {
        /// Run only this gate: dependency, coverage, bundle, performance.
        #[arg(long)]
        gate: Option<GateKind>,

        /// Config file (default: $TOLLGATE_CONFIG, then .tollgate/config.json).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show how a command or file path would be classified.
    Classify {
        /// Host tool name: Bash, Write, Edit.
        #[arg(long, default_value = "Bash")]
        tool: String,

        /// Command text, or file path for file tools.
        text: String,
    },

    /// Inspect or reset stored baselines.
    Baseline {
        #[command(subcommand)]
        action: BaselineCmd,
    },

    /// Print or verify the measurement history of a domain.
    History {
        /// Measurement domain: bundle, performance.
        domain: String,

        /// Verify the hash chain instead of printing entries.
        #[arg(long)]
        verify: bool,
    },

    /// Verify the decision log's hash chain.
    Audit {
        #[arg(long)]
        verify: bool,
    },

    /// Validate a config file: schema + limits + classifier patterns + lint.
    Check {
        /// Path to config .json file.
        file: String,

        /// Output structured JSON report.
        #[arg(long)]
        json: bool,

        /// Fail on warnings (not just errors).
        #[arg(long)]
        strict: bool,
    },

    /// Write a starter .tollgate/config.json.
    Init {
        /// Overwrite an existing config.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum BaselineCmd {
    /// List stored baselines.
    List,

    /// Print one baseline as JSON.
    Show {
        domain: String,

        /// Baseline key; the bundle gate keys by platform (web, mobile, game).
        #[arg(long, default_value = DEFAULT_KEY)]
        key: String,
    },

    /// Delete a baseline; the next measurement records a new one.
    Reset {
        domain: String,

        #[arg(long, default_value = DEFAULT_KEY)]
        key: String,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => usage_error(e),
    };
    let root = cli.root.clone();
    let cwd = || root.clone().unwrap_or_else(|| PathBuf::from("."));

    match cli.cmd {
        Cmd::Hook { gate, config } => {
            let code = cmd_hook(root.as_deref(), gate, config.as_deref());
            std::process::exit(code);
        }

        Cmd::Classify { tool, text } => cmd_classify(&cwd(), &tool, &text),

        Cmd::Baseline { action } => cmd_baseline(&cwd(), action),

        Cmd::History { domain, verify } => cmd_history(&cwd(), &domain, verify),

        Cmd::Audit { verify } => cmd_audit(&cwd(), verify),

        Cmd::Check { file, json, strict } => cmd_check(&file, json, strict),

        Cmd::Init { force } => cmd_init(&cwd(), force),
    }
}

/// Clap exits with 2 on bad arguments, which the host reads as a deny.
/// A misconfigured `hook` line must fail open instead.
fn usage_error(e: clap::Error) -> ! {
    if !e.use_stderr() {
        let _ = e.print();
        std::process::exit(0);
    }
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !invoked_as_hook(&args) {
        let _ = e.print();
        std::process::exit(1);
    }

    let rendered = e.to_string();
    let summary = rendered
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ");
    warn!("hook arguments rejected: {summary}");
    let _ = io::stdin().read_to_end(&mut Vec::new());
    let code = respond(
        &Decision::allow(format!("hook arguments ignored: {summary}")),
        HookPhase::Unknown,
    );
    std::process::exit(code)
}

/// Whether the first subcommand word is `hook`, skipping `--root <dir>`.
fn invoked_as_hook(args: &[String]) -> bool {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--root" {
            iter.next();
        } else if !arg.starts_with('-') {
            return arg == "hook";
        }
    }
    false
}

/// Diagnostics go to stderr; stdout carries only command output.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Config from `--config`, then `$TOLLGATE_CONFIG`, then the project's
/// `.tollgate/config.json`. Missing or broken files mean defaults.
fn load_config(root: &Path, explicit: Option<&Path>) -> TollgateConfig {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| config_path(root));
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return TollgateConfig::default();
    }
    match TollgateConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("ignoring config, using defaults: {e:#}");
            TollgateConfig::default()
        }
    }
}

// ── Hook ────────────────────────────────────────────────────────

/// Never fails: every internal problem answers allow with exit 0.
fn cmd_hook(root: Option<&Path>, gate: Option<GateKind>, config: Option<&Path>) -> i32 {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        warn!("cannot read hook input: {e}");
        return respond(&Decision::allow(""), HookPhase::Unknown);
    }
    let event = match event::decode(&input) {
        Ok(event) => event,
        Err(e) => {
            warn!("{e}");
            return respond(
                &Decision::allow(format!("hook input ignored: {e}")),
                HookPhase::Unknown,
            );
        }
    };

    let root = root
        .map(Path::to_path_buf)
        .unwrap_or_else(|| event.working_directory.clone());
    let config = load_config(&root, config);

    let decision = catch_unwind(AssertUnwindSafe(|| {
        Pipeline::from_config(&root, &config).only(gate).run(&event)
    }))
    .unwrap_or_else(|_| {
        warn!("gate evaluation panicked; allowing");
        Decision::allow("")
    });
    respond(&decision, event.phase)
}

fn respond(decision: &Decision, phase: HookPhase) -> i32 {
    let stdout = io::stdout();
    let stderr = io::stderr();
    let code = match emit(decision, phase, &mut stdout.lock(), &mut stderr.lock()) {
        Ok(code) => code,
        Err(e) => {
            warn!("cannot write hook response: {e}");
            0
        }
    };
    let _ = io::stdout().flush();
    code
}

// ── Inspection ──────────────────────────────────────────────────

#[derive(Serialize)]
struct ClassifyReport {
    domain: Domain,
    platform: Platform,
    rule_id: Option<String>,
    gates: Vec<GateKind>,
}

fn cmd_classify(root: &Path, tool: &str, text: &str) -> Result<()> {
    let kind = ToolKind::from_host_name(tool);
    let mut event = if kind.is_file() {
        ExecutionEvent::file_write(text, root)
    } else {
        ExecutionEvent::shell(text, root)
    };
    event.tool = kind;

    let config = load_config(root, None);
    let pipeline = Pipeline::from_config(root, &config);
    let classification = pipeline.classify(&event);
    let gates = if config.enabled {
        pipeline.applicable(&event, &classification)
    } else {
        Vec::new()
    };
    let report = ClassifyReport {
        domain: classification.domain,
        platform: classification.platform,
        rule_id: classification.rule_id,
        gates,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_baseline(root: &Path, action: BaselineCmd) -> Result<()> {
    let store = BaselineStore::new(FsBackend::in_state_dir(&state_dir(root)));
    match action {
        BaselineCmd::List => {
            let records = store.list()?;
            if records.is_empty() {
                eprintln!("  no baselines in {}", store.backend().dir().display());
            }
            for r in records {
                let metrics = r
                    .metrics
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!(
                    "{:<12} {:<10} {}  {metrics}",
                    r.domain,
                    r.key,
                    r.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
            }
        }
        BaselineCmd::Show { domain, key } => match store.read(&domain, &key)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => bail!("no baseline for {domain} ({key})"),
        },
        BaselineCmd::Reset { domain, key } => {
            if store.reset(&domain, &key)? {
                eprintln!("  removed baseline {domain} ({key})");
            } else {
                eprintln!("  no baseline for {domain} ({key})");
            }
        }
    }
    Ok(())
}

fn cmd_history(root: &Path, domain: &str, verify: bool) -> Result<()> {
    let path = history_path(&state_dir(root), domain);
    if !path.exists() {
        eprintln!("  no history at {}", path.display());
        return Ok(());
    }
    if verify {
        let count = verify_history(&path)?;
        eprintln!("  history chain valid ({count} entries)");
        return Ok(());
    }
    for entry in read_history(&path)? {
        println!(
            "{}  {}  {}",
            entry.ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            entry.key,
            serde_json::to_string(&entry.metrics)?
        );
    }
    Ok(())
}

fn cmd_audit(root: &Path, verify: bool) -> Result<()> {
    if !verify {
        bail!("specify --verify");
    }
    let path = decisions_path(&state_dir(root));
    if !path.exists() {
        eprintln!("  no decision log found at {}", path.display());
        return Ok(());
    }
    let count = verify_chain(&path)?;
    eprintln!("  decision chain valid ({count} entries)");
    Ok(())
}

// ── Config ──────────────────────────────────────────────────────

fn cmd_check(file: &str, json_out: bool, strict: bool) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("cannot read {file}"))?;
    let data: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("{file}: invalid JSON"))?;

    let report = tollgate_core::schema::check(&data, file, strict);

    if json_out {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if report.pass {
            eprintln!("  ok  {file}");
        } else {
            eprintln!("  FAIL {file}");
        }
        for e in &report.errors {
            eprintln!(
                "  error {}: {} {}",
                e.code,
                e.message,
                e.path.as_deref().unwrap_or("")
            );
        }
        for w in &report.warnings {
            eprintln!(
                "  warn  {}: {} {}",
                w.code,
                w.message,
                w.path.as_deref().unwrap_or("")
            );
        }
    }

    if !report.pass {
        bail!("check failed for {file}");
    }
    Ok(())
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    let path = config_path(root);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let mut json = serde_json::to_string_pretty(&TollgateConfig::starter())?;
    json.push('\n');
    atomic_write(&path, json.as_bytes())?;
    eprintln!("created {}", path.display());
    Ok(())
}
