use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use symjoin::commands;
use symjoin::commands::join::JoinArgs;
use symjoin::commands::util::parse_image_base;

/// Deterministic correlation of debug-symbol, source-parse, and
/// decompiler views of one compiled binary.
///
/// This CLI is a thin wrapper around `align-core` (exposed in code as
/// `align_core`). All substantive logic lives in the library so it can
/// be tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "symjoin",
    version,
    about = "Correlate debug-symbol, source-parse, and decompiler views of a binary",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Map debug-symbol functions to parsed source spans by
    /// line-attribution overlap.
    Align {
        /// Debug-symbol functions document (JSON).
        #[arg(long)]
        dwarf: PathBuf,

        /// Structural source-span inventory (JSON).
        #[arg(long)]
        spans: PathBuf,

        /// Directory of preprocessed translation units (*.i).
        #[arg(long)]
        preprocessed: PathBuf,

        /// Output directory for alignment_pairs.json / alignment_report.json.
        #[arg(long)]
        out: PathBuf,

        /// Optional profile YAML overriding the v1 defaults.
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Optional runs-ledger SQLite file to record this invocation.
        #[arg(long)]
        runs_db: Option<PathBuf>,
    },

    /// Map debug-symbol functions to decompiler functions by byte-range
    /// overlap and emit the joined dataset.
    Join {
        /// Debug-symbol functions document (JSON).
        #[arg(long)]
        dwarf: PathBuf,

        /// Alignment pairs document produced by `align` (JSON).
        #[arg(long)]
        alignment: PathBuf,

        /// Decompiler function inventory (JSONL).
        #[arg(long)]
        ghidra_functions: PathBuf,

        /// Decompiler CFG summaries (JSONL).
        #[arg(long)]
        ghidra_cfg: Option<PathBuf>,

        /// Decompiler variable records (JSONL).
        #[arg(long)]
        ghidra_variables: Option<PathBuf>,

        /// Build-context provenance document (JSON).
        #[arg(long)]
        context: Option<PathBuf>,

        /// Image base to subtract from decompiler addresses (hex or decimal).
        #[arg(long, default_value = "0")]
        image_base: String,

        /// Output directory for joined_functions.jsonl / join_report.json.
        #[arg(long)]
        out: PathBuf,

        /// Optional profile YAML overriding the v1 defaults.
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Optional runs-ledger SQLite file to record this invocation.
        #[arg(long)]
        runs_db: Option<PathBuf>,
    },

    /// Run both engines over every cell directory under a batch root.
    ///
    /// A cell that fails to load degrades to an explicit reject entry in
    /// the batch summary; the rest of the batch still completes.
    Batch {
        /// Directory containing one sub-directory per binary variant.
        #[arg(long)]
        root: PathBuf,

        /// Output root; per-cell outputs land in <out>/<cell>/.
        #[arg(long)]
        out: PathBuf,

        /// Optional alignment profile YAML.
        #[arg(long)]
        align_profile: Option<PathBuf>,

        /// Optional address-join profile YAML.
        #[arg(long)]
        join_profile: Option<PathBuf>,

        /// Optional runs-ledger SQLite file to record per-cell outcomes.
        #[arg(long)]
        runs_db: Option<PathBuf>,
    },

    /// List recorded engine runs from a ledger.
    Runs {
        /// Runs-ledger SQLite file.
        #[arg(long)]
        db: PathBuf,

        /// Only show runs for this binary.
        #[arg(long)]
        binary: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Align { dwarf, spans, preprocessed, out, profile, runs_db } => {
            commands::align::align_command(
                &dwarf,
                &spans,
                &preprocessed,
                &out,
                profile.as_deref(),
                runs_db.as_deref(),
            )
        }
        Command::Join {
            dwarf,
            alignment,
            ghidra_functions,
            ghidra_cfg,
            ghidra_variables,
            context,
            image_base,
            out,
            profile,
            runs_db,
        } => commands::join::join_command(JoinArgs {
            dwarf: &dwarf,
            alignment: &alignment,
            ghidra_functions: &ghidra_functions,
            ghidra_cfg: ghidra_cfg.as_deref(),
            ghidra_variables: ghidra_variables.as_deref(),
            context: context.as_deref(),
            image_base: parse_image_base(&image_base)?,
            out: &out,
            profile_path: profile.as_deref(),
            runs_db: runs_db.as_deref(),
        }),
        Command::Batch { root, out, align_profile, join_profile, runs_db } => {
            commands::batch::batch_command(
                &root,
                &out,
                align_profile.as_deref(),
                join_profile.as_deref(),
                runs_db.as_deref(),
            )
        }
        Command::Runs { db, binary, json } => {
            commands::runs::runs_command(&db, binary.as_deref(), json)
        }
    }
}
