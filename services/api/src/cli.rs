use crate::demo::{run_demo, run_leaderboard_report, DemoArgs, LeaderboardReportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use reputation::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Reputation Pipeline Service",
    about = "Run the reputation event pipeline and inspect its derived views from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect leaderboards computed from a seeded demo event stream
    Leaderboard {
        #[command(subcommand)]
        command: LeaderboardCommand,
    },
    /// Run an end-to-end CLI demo covering summaries, leaderboards, and analytics
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum LeaderboardCommand {
    /// Render one leaderboard for stakeholder demos
    Report(LeaderboardReportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Leaderboard {
            command: LeaderboardCommand::Report(args),
        } => run_leaderboard_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
