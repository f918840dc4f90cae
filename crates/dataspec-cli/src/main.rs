use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use dataspec_bundle::BundleType;
use std::io;
use std::path::PathBuf;

mod commands;
mod telemetry;
mod workspace;

use workspace::Workspace;

/// Dataspec bundle resolution and compatibility tooling.
///
/// Resolves consumer requirements against the channel release catalog into
/// hash-verified bundles, locks them, and checks spec changes against
/// production locks before they are published.
///
/// EXAMPLES:
///     dataspec create --from-consumer end_to_end           Build a snapshot bundle
///     dataspec create --from-consumer end_to_end --type release --register
///     dataspec validate bundles/release/end_to_end-1.2.0.yaml
///     dataspec lock bundles/release/end_to_end-1.2.0.yaml  Write <bundle>.lock.json
///     dataspec check-compat --base-ref main --head-ref HEAD --fail-on-breaking
///
/// ENVIRONMENT VARIABLES:
///     DATASPEC_ROOT             Workspace root (same as --root)
///     DATASPEC_CATALOG_BACKEND  fs or index
///     DATASPEC_CATALOG_INDEX    Index document for the index backend
///     DATASPEC_LOG_LEVEL        Default log filter
///     DATASPEC_LOG_JSON         Set to 1 for JSON logs
///     RUST_LOG                  Overrides the log filter entirely
#[derive(Parser)]
#[command(name = "dataspec")]
#[command(version)]
struct Cli {
    /// Workspace root (defaults to the nearest directory holding dataspec.toml)
    #[arg(long, global = true, env = "DATASPEC_ROOT")]
    root: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a consumer's requirements into a bundle
    ///
    /// Every requirement is resolved to the highest satisfying release.
    /// Unresolvable required channels abort the build and are all listed.
    ///
    /// EXAMPLES:
    ///     dataspec create --from-consumer end_to_end
    ///     dataspec create --from-consumer consumers/e2e.yaml --type weekly
    ///     dataspec create --from-consumer e2e --name nightly --version 2026.01
    Create {
        /// Consumer file path, or a consumer name under the consumers directory
        #[arg(long)]
        from_consumer: String,
        /// Bundle name (defaults to the consumer name)
        #[arg(long)]
        name: Option<String>,
        /// Bundle version label (defaults by bundle type)
        #[arg(long)]
        version: Option<String>,
        /// Bundle type: snapshot, weekly or release
        #[arg(long = "type", default_value = "snapshot")]
        bundle_type: BundleType,
        /// Output path (defaults to bundles/<type>/<name>-<version>.yaml)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Register consumer@version -> bundle in the alias registry
        #[arg(long)]
        register: bool,
    },

    /// Validate a bundle file
    ///
    /// Checks required fields, that every pinned release exists, and that
    /// the integrity hash matches the channel list.
    Validate {
        /// Path to the bundle file
        bundle: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Only print errors
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Generate (or verify) the lock file for a bundle
    ///
    /// EXAMPLES:
    ///     dataspec lock bundles/release/e2e-1.0.0.yaml
    ///     dataspec lock bundles/release/e2e-1.0.0.yaml --check
    Lock {
        /// Path to the bundle file
        bundle: PathBuf,
        /// Lock path (defaults to <bundle>.lock.json)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Verify an existing lock instead of writing one
        #[arg(long)]
        check: bool,
    },

    /// Summarize a bundle
    Analyze {
        /// Path to the bundle file
        bundle: PathBuf,
        /// Include recorded family conflicts
        #[arg(long)]
        conflicts: bool,
        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check spec changes between two git refs
    ///
    /// Classifies breaking changes and flags channels pinned by an active
    /// production lock.
    ///
    /// EXAMPLES:
    ///     dataspec check-compat --base-ref main --head-ref HEAD
    ///     dataspec check-compat --base-ref v1 --head-ref v2 -o report.json --fail-on-breaking
    CheckCompat {
        /// Base git reference
        #[arg(long)]
        base_ref: String,
        /// Head git reference
        #[arg(long)]
        head_ref: String,
        /// Consumer matrix (defaults to compatibility/consumer_matrix.yaml)
        #[arg(long)]
        matrix: Option<PathBuf>,
        /// Write the full report as JSON
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Exit with status 1 on breaking changes or production conflicts
        #[arg(long)]
        fail_on_breaking: bool,
    },

    /// Consumer version aliases
    Alias {
        #[command(subcommand)]
        action: AliasCommand,
    },

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     dataspec completions bash > ~/.bash_completions/dataspec.bash
    ///     dataspec completions zsh > ~/.zfunc/_dataspec
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum AliasCommand {
    /// Record consumer@version -> bundle and move `latest` to it
    Register {
        #[arg(long)]
        consumer: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        bundle: PathBuf,
        #[arg(long = "type", default_value = "weekly")]
        bundle_type: BundleType,
    },
    /// Print the bundle registered for a consumer version
    Resolve {
        consumer: String,
        /// Consumer version (defaults to latest)
        #[arg(long)]
        version: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let ws = Workspace::load(cli.root.as_deref())?;
    let logging = &ws.config.project.logging;
    telemetry::init(
        &telemetry::level_for(cli.verbose, &logging.level),
        cli.json_logs || logging.json,
    );

    match cli.command {
        Commands::Create {
            from_consumer,
            name,
            version,
            bundle_type,
            output,
            register,
        } => {
            let args = commands::create::CreateArgs {
                consumer: from_consumer,
                name,
                version,
                bundle_type,
                output,
                register,
            };
            commands::create::run(&ws, args)?;
        }
        Commands::Validate {
            bundle,
            json,
            quiet,
        } => {
            commands::validate::run(&ws, &bundle, json, quiet)?;
        }
        Commands::Lock {
            bundle,
            output,
            check,
        } => {
            commands::lock::run(&ws, &bundle, output, check)?;
        }
        Commands::Analyze {
            bundle,
            conflicts,
            json,
        } => {
            commands::analyze::run(&bundle, conflicts, json)?;
        }
        Commands::CheckCompat {
            base_ref,
            head_ref,
            matrix,
            output,
            fail_on_breaking,
        } => {
            let args = commands::check_compat::CheckCompatArgs {
                base_ref,
                head_ref,
                matrix,
                output,
                fail_on_breaking,
            };
            commands::check_compat::run(&ws, args)?;
        }
        Commands::Alias { action } => match action {
            AliasCommand::Register {
                consumer,
                version,
                bundle,
                bundle_type,
            } => commands::alias::register(&ws, &consumer, &version, &bundle, bundle_type)?,
            AliasCommand::Resolve { consumer, version } => {
                commands::alias::resolve(&ws, &consumer, version.as_deref())?
            }
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
