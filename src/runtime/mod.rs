pub mod args;
pub mod status;

pub use args::{parse_cli_args, print_usage, Backend, CliArgs, Command};
pub use status::emit_startup_status;
