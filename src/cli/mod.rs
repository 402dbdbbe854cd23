mod args;
mod recording;

pub use args::{Cli, CliCommand, CombineCliArgs, FetchCliArgs, StatusCliArgs};
pub use recording::{handle_combine_command, handle_fetch_command, handle_status_command};
