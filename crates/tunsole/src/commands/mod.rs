//! Command dispatch: bridges CLI args -> session operations -> output.

pub mod config_cmd;
pub mod login;
pub mod proxy;
pub mod routes;
pub mod status;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

use self::util::Target;

/// Dispatch a daemon-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, target: Target, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => login::handle(args, target, global).await,
        Command::Status => status::handle(target, global).await,
        Command::Routes(args) => routes::handle(args, target, global).await,
        Command::Proxy(args) => proxy::handle(args, target, global).await,
        Command::Watch(args) => watch::handle(args, target, global).await,
        // Handled before a target is resolved
        Command::Logout | Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
