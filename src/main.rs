//! Binary entrypoint for the gardenbot CLI.
//!
//! Commands:
//! - `run` - run the growth scheduler daemon against the configured store
//! - `init` - create a starter `config.toml`
//! - `tick` - force one growth tick now and print the report
//! - `price --user <id>` - print a user's stalk price for today
//! - `show --guild <id> --user <id>` - print a player's garden
//!
//! See the library crate docs for module-level details: `gardenbot::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use gardenbot::config::Config;
use gardenbot::garden::{
    self, group_stacks, stalk_price, GardenStore, GrowthScheduler, ItemKind,
};
use gardenbot::logutil::escape_log;

#[derive(Parser)]
#[command(name = "gardenbot")]
#[command(about = "Garden economy engine for chat-bot minigames")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the growth scheduler daemon
    Run,
    /// Initialize a new configuration file
    Init,
    /// Force one growth tick immediately
    Tick,
    /// Print a user's stalk price for today
    Price {
        /// User id the price is derived for
        #[arg(short, long)]
        user: String,
    },
    /// Print a player's garden
    Show {
        /// Guild id the garden belongs to
        #[arg(short, long)]
        guild: String,
        /// User id owning the garden
        #[arg(short, long)]
        user: String,
        /// Dump the raw stack rows as JSON instead of the grid view
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(config: &Option<Config>, verbose: u8) {
    let level = match verbose {
        0 => config
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|| "info".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Run => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting gardenbot v{}", env!("CARGO_PKG_VERSION"));
            let store = GardenStore::open(&config.storage.data_dir)?;
            let mut scheduler = GrowthScheduler::new(config.garden.frequency());
            info!(
                "growth schedule: {}",
                scheduler.frequency().description()
            );

            let mut poll = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        if let Err(e) = scheduler.check_and_run(&store, chrono::Utc::now()) {
                            log::error!("growth tick failed: {}", e);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown requested, stopping scheduler");
                        break;
                    }
                }
            }
        }
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("Wrote starter configuration to {}", cli.config);
        }
        Commands::Tick => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let store = GardenStore::open(&config.storage.data_dir)?;
            let report = garden::run_growth_tick(&store, chrono::Utc::now())?;
            println!(
                "{} gardens: {} grown ({} bonus), {} withered, {} spoiled, {} failures",
                report.gardens,
                report.grown,
                report.bonus_growth,
                report.withered,
                report.spoiled,
                report.failures
            );
        }
        Commands::Price { user } => {
            let price = stalk_price(&user, chrono::Utc::now().date_naive());
            println!(
                "stalk price for {} today: {} coins",
                escape_log(&user),
                price
            );
        }
        Commands::Show { guild, user, json } => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let store = GardenStore::open(&config.storage.data_dir)?;
            let stacks = store.list_stacks(&guild, &user)?;
            if !stacks.iter().any(|s| s.kind == ItemKind::House) {
                println!(
                    "{}:{} has no garden yet",
                    escape_log(&guild),
                    escape_log(&user)
                );
                return Ok(());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&stacks)?);
            } else {
                print_garden(&stacks);
            }
        }
    }
    Ok(())
}

fn print_garden(stacks: &[gardenbot::garden::ItemStack]) {
    println!("  1  2  3  4  5");
    for y in 1..=5u8 {
        let mut row = format!("{} ", (b'A' + y - 1) as char);
        for x in 1..=5u8 {
            let cell = stacks.iter().find(|s| s.x == x && s.y == y);
            let glyph = match cell {
                Some(s) if s.kind == ItemKind::House => " H ".to_string(),
                Some(s) => format!(
                    "{}{} ",
                    s.kind.as_str().chars().next().unwrap_or('?'),
                    s.quantity
                ),
                None => " . ".to_string(),
            };
            row.push_str(&glyph);
        }
        println!("{}", row);
    }
    println!();
    for entry in group_stacks(stacks) {
        if entry.x == 0 && entry.y == 0 && entry.quantity > 0 {
            println!("{:>12}: {}", entry.kind.as_str(), entry.quantity);
        }
    }
}
