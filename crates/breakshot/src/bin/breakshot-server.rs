//! Runs one 9-ball match and exits when it is over.

use std::time::Duration;

use breakshot::prelude::*;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    address: String,

    /// Port to listen on
    #[arg(short, long, default_value = "9000")]
    port: u16,

    /// Games a player must win to take the match
    #[arg(short, long, default_value = "10")]
    race_to: u32,

    /// Number of players
    #[arg(short, long, default_value = "2")]
    seats: usize,

    /// Seconds the active player has to shoot (0 waits forever)
    #[arg(long, default_value = "60")]
    turn_timeout_secs: u64,

    /// Seconds a disconnected player has to come back
    #[arg(long, default_value = "30")]
    reconnect_grace_secs: u64,

    /// Pocketing the 9 on a foul loses the game (default)
    #[arg(long, conflicts_with = "lenient")]
    strict: bool,

    /// Pocketing the 9 on a foul still wins the game
    #[arg(long)]
    lenient: bool,

    /// Refuse spectator connections
    #[arg(long)]
    no_spectators: bool,

    /// Seed for the stand-in physics engine (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let rules = RuleSet {
            winning_ball_foul: if self.lenient && !self.strict {
                WinningBallFoul::Lenient
            } else {
                WinningBallFoul::Strict
            },
            ..RuleSet::default()
        };
        let turn_timeout = (self.turn_timeout_secs > 0).then(|| Duration::from_secs(self.turn_timeout_secs));

        ServerConfig {
            bind: format!("{}:{}", self.address, self.port),
            match_config: MatchConfig {
                seats: self.seats,
                race_to: self.race_to,
                turn_timeout,
                reconnect_grace: Duration::from_secs(self.reconnect_grace_secs),
                rules,
                ..MatchConfig::default()
            },
            spectators: SpectatorConfig {
                enabled: !self.no_spectators,
                ..SpectatorConfig::default()
            },
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let seed = args.seed.unwrap_or_else(rand::random);
    tracing::info!(seed, "using random physics");

    let server = BreakshotServer::<breakshot_protocol::JsonCodec>::builder()
        .config(args.server_config())
        .build(RandomPhysics::new(seed))
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    let matches = server.match_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, aborting match");
            let _ = matches.shutdown("server shutting down").await;
        }
    });

    let summary = server.run().await?;
    tracing::info!(phase = %summary.phase, games = summary.games_played, "match finished");
    for standing in &summary.standings {
        tracing::info!(seat = %standing.seat, name = %standing.name, games_won = standing.games_won, "final standing");
    }

    Ok(())
}
