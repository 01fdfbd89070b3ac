use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use uuid::Uuid;

use sva_audit::{verify_hash_chain, VerifyResult};
use sva_cli::commands::{self, audit, query};

#[derive(Parser)]
#[command(name = "sva")]
#[command(about = "Coin supply audit and reconciliation ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an audit over scanner events (JSONL). Exits non-zero on halt.
    Audit {
        /// Layered config paths in merge order (base -> overrides)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Events file; reads stdin when omitted or "-"
        #[arg(long)]
        events: Option<PathBuf>,

        /// Resume from an explicit miner delta log dump
        #[arg(long, conflicts_with_all = ["resume_latest", "resume_state"])]
        resume: Option<PathBuf>,

        /// Resume from the highest-count checkpoint in the checkpoint dir
        #[arg(long, default_value_t = false)]
        resume_latest: bool,

        /// Resume from the configured state file in the checkpoint dir
        #[arg(long, default_value_t = false, conflicts_with = "resume_latest")]
        resume_state: bool,

        /// Start empty, deleting any state file and checkpoints already in the
        /// checkpoint dir. Without a resume flag or this, existing history is an error.
        #[arg(long, default_value_t = false, conflicts_with_all = ["resume", "resume_latest", "resume_state"])]
        fresh: bool,
    },

    /// Cumulative deviation strictly before a height
    Deviation {
        /// Miner delta log dump to replay
        #[arg(long)]
        state: PathBuf,

        #[arg(long)]
        height: u64,

        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Per-miner deviation totals, largest first
    Miners {
        #[arg(long)]
        state: PathBuf,

        /// Show at most this many miners
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Inspection log utilities
    Inspection {
        #[command(subcommand)]
        cmd: InspectionCmd,
    },
}

#[derive(Subcommand)]
enum InspectionCmd {
    /// Verify the hash chain of an inspection log
    Verify { path: PathBuf },
}

fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Audit {
            config_paths,
            events,
            resume,
            resume_latest,
            resume_state,
            fresh,
        } => {
            let (loaded, cfg) = commands::load_config(&config_paths)?;
            if let Some(l) = &loaded {
                println!("config_hash={}", l.config_hash);
            }

            let resume = match (resume, resume_latest, resume_state, fresh) {
                (Some(path), _, _, _) => audit::ResumeFrom::File(path),
                (None, true, _, _) => audit::ResumeFrom::LatestCheckpoint,
                (None, false, true, _) => audit::ResumeFrom::StateFile,
                (None, false, false, true) => audit::ResumeFrom::Fresh,
                (None, false, false, false) => audit::ResumeFrom::Empty,
            };
            let args = audit::AuditRunArgs {
                config: &cfg,
                resume,
                run_id: Uuid::new_v4(),
            };

            let summary = match events {
                Some(p) if p.as_os_str() != "-" => {
                    let f = File::open(&p)
                        .with_context(|| format!("open events file {}", p.display()))?;
                    audit::run_audit(args, BufReader::new(f))?
                }
                _ => audit::run_audit(args, io::stdin().lock())?,
            };

            println!("run_id={}", summary.run_id);
            println!(
                "events={} skipped={} clean={} recorded={} checkpoints={}",
                summary.events_read,
                summary.skipped,
                summary.clean,
                summary.recorded,
                summary.checkpoints.len()
            );
            println!(
                "running_total={} tip_height={}",
                summary.running_total,
                summary
                    .tip_height
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );

            if let Some(halt) = &summary.halt {
                let halt_json =
                    serde_json::to_string(halt).context("serialize halt reason failed")?;
                anyhow::bail!("AUDIT_HALTED {}", halt_json);
            }
        }

        Commands::Deviation {
            state,
            height,
            config_paths,
        } => {
            let (_, cfg) = commands::load_config(&config_paths)?;
            let r = query::deviation(&state, height, cfg.ledger_config())?;
            println!(
                "height={} deviation={} running_total={} entries={}",
                r.height, r.deviation, r.running_total, r.entries
            );
        }

        Commands::Miners {
            state,
            limit,
            config_paths,
        } => {
            let (_, cfg) = commands::load_config(&config_paths)?;
            for m in query::miners(&state, limit, cfg.ledger_config())? {
                println!(
                    "total={} entries={} first_height={} last_height={} key={}",
                    m.total, m.entries, m.first_height, m.last_height, m.key
                );
            }
        }

        Commands::ConfigHash { paths } => {
            let refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = sva_config::load_layered_yaml(&refs)?;
            // Validate the typed view too, so a bad file fails here rather than mid-run.
            loaded.audit_config()?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Inspection { cmd } => match cmd {
            InspectionCmd::Verify { path } => match verify_hash_chain(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("inspection_chain=VALID lines={}", lines);
                }
                VerifyResult::Broken { line, reason } => {
                    anyhow::bail!("INSPECTION_CHAIN_BROKEN line={} reason={}", line, reason);
                }
            },
        },
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();
}
