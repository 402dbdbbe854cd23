use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bbb-recording")]
#[command(about = "Download, combine and deliver conference recordings", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the HTTP API (default)
    Serve,
    /// Download a recording and combine its tracks
    Fetch(FetchCliArgs),
    /// Combine the tracks of an already downloaded recording
    Combine(CombineCliArgs),
    /// Show the persisted progress of a run
    Status(StatusCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct FetchCliArgs {
    /// Playback URL of the meeting
    pub url: String,
    /// Human readable name; the meeting id is used when omitted
    #[arg(short, long, default_value = "")]
    pub name: String,
    /// Send the download notice to this address
    #[arg(short, long)]
    pub email: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct CombineCliArgs {
    /// Working directory name of the run
    pub run_key: String,
    /// Ship the webcams track alone instead of merging
    #[arg(long)]
    pub primary_only: bool,
}

#[derive(ClapArgs, Debug)]
pub struct StatusCliArgs {
    /// Working directory name of the run
    pub run_key: String,
}
