mod compare_cmd;
mod config;
mod history_cmd;
mod negotiate_cmd;
mod preflight_cmd;
mod profiles_cmd;
mod runtime;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, CommandFactory, Parser, Subcommand};

use parley_core::backend::BackendId;
use parley_core::negotiation::NegotiationError;
use parley_db::models::RunMode;

use config::{CliOverrides, ParleyConfig};

pub const DEFAULT_COMPARE_TOPIC: &str =
    "Should AI systems be allowed to negotiate on behalf of humans?";

#[derive(Parser)]
#[command(
    name = "parley",
    version,
    about = "Run principled negotiations between LLM agents"
)]
struct Cli {
    /// Database URL (overrides PARLEY_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Negotiate a topic between two agents
    Negotiate {
        /// The question or proposal to negotiate
        topic: Option<String>,
        #[command(flatten)]
        run: RunArgs,
        /// Schedule principal calls in parallel or sequentially
        #[arg(long)]
        mode: Option<RunMode>,
        /// Also store the report in PostgreSQL
        #[arg(long)]
        persist: bool,
        /// Print the report as JSON instead of Markdown
        #[arg(long)]
        json: bool,
    },
    /// Run a topic in both modes and compare phase timings
    Compare {
        /// Topic to negotiate
        topic: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Ping every configured backend and preview provider resolution
    Preflight {
        #[command(flatten)]
        run: RunArgs,
    },
    /// List available agent profiles
    Profiles {
        /// Show axioms and backends for each profile
        #[arg(long)]
        verbose: bool,
    },
    /// List stored negotiation runs
    History {
        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Write a parley config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Options shared by every command that seats agents.
#[derive(Args, Debug, Default, Clone)]
struct RunArgs {
    /// Number of rounds, opening included
    #[arg(long)]
    rounds: Option<u32>,
    /// Profile id for agent A
    #[arg(long)]
    agent_a: Option<String>,
    /// Profile id for agent B
    #[arg(long)]
    agent_b: Option<String>,
    /// Profile id for the stress-test critic
    #[arg(long, conflicts_with = "no_critic")]
    critic: Option<String>,
    /// Skip the stress test
    #[arg(long)]
    no_critic: bool,
    /// Backend the arbiter runs on (defaults to agent A's)
    #[arg(long)]
    arbiter: Option<BackendId>,
    /// Directory for report files
    #[arg(long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self, mode: Option<RunMode>, database_url: Option<String>) -> CliOverrides {
        CliOverrides {
            rounds: self.rounds,
            mode,
            agent_a: self.agent_a.clone(),
            agent_b: self.agent_b.clone(),
            critic: self.critic.clone(),
            no_critic: self.no_critic,
            arbiter: self.arbiter,
            output: self.output.clone(),
            database_url,
        }
    }
}

/// Execute the `parley init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    config::save_config_to(&path, &config::starter_config())?;

    println!("Config written to {}", path.display());
    println!("Add API keys under [credentials] or export them, e.g. ANTHROPIC_API_KEY.");
    println!();
    println!("Next: run `parley preflight` to check your backends.");
    Ok(())
}

fn print_help(subcommand: Option<&str>) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    cmd.build();
    let target = match subcommand {
        Some(name) => cmd.find_subcommand_mut(name),
        None => None,
    };
    match target {
        Some(sub) => sub.print_help()?,
        None => Cli::command().print_help()?,
    }
    println!();
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        return print_help(None);
    };
    let database_url = cli.database_url;

    match command {
        Commands::Negotiate {
            topic,
            run,
            mode,
            persist,
            json,
        } => {
            let Some(topic) = topic.filter(|t| !t.trim().is_empty()) else {
                return print_help(Some("negotiate"));
            };
            let cfg = ParleyConfig::resolve(&run.overrides(mode, database_url))?;
            negotiate_cmd::run_negotiate(&cfg, &topic, persist, json).await
        }
        Commands::Compare { topic, run } => {
            let topic = topic.unwrap_or_else(|| DEFAULT_COMPARE_TOPIC.to_string());
            let cfg = ParleyConfig::resolve(&run.overrides(None, database_url))?;
            compare_cmd::run_compare(&cfg, &topic).await
        }
        Commands::Preflight { run } => {
            let cfg = ParleyConfig::resolve(&run.overrides(None, database_url))?;
            preflight_cmd::run_preflight(&cfg).await
        }
        Commands::Profiles { verbose } => {
            let cfg = ParleyConfig::resolve(&CliOverrides::default())?;
            profiles_cmd::run_profiles(&cfg, verbose)
        }
        Commands::History { limit } => {
            let cfg = ParleyConfig::resolve(&CliOverrides {
                database_url,
                ..CliOverrides::default()
            })?;
            history_cmd::run_history(&cfg, limit).await
        }
        Commands::Init { force } => cmd_init(force),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "parley", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// One line on stderr; negotiation errors carry backend, status and a hint.
fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<NegotiationError>() {
        Some(neg) => {
            let mut line = format!("error: {neg}");
            if let Some(backend) = neg.backend() {
                line.push_str(&format!(" [backend={backend}"));
                if let Some(status) = neg.status() {
                    line.push_str(&format!(" status={status}"));
                }
                line.push(']');
            }
            eprintln!("{line} ({})", neg.diagnosis());
        }
        None => eprintln!("error: {err:#}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}
