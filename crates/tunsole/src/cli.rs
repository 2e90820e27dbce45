//! Clap derive structures for the `tunsole` CLI.
//!
//! Kept free of workspace types so build.rs can compile it for man pages.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tunsole -- operator console for a tun2socks daemon
#[derive(Debug, Parser)]
#[command(
    name = "tunsole",
    version,
    about = "Inspect and steer a tun2socks daemon from the command line",
    long_about = "Shows TUN device, engine and proxy status, edits the routes sent\n\
        through the tunnel, and follows live state by merging polls with\n\
        the daemon's service event stream.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Daemon profile to use
    #[arg(long, short = 'p', env = "TUNSOLE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Daemon URL (overrides profile)
    #[arg(long, short = 'e', env = "TUNSOLE_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Bearer token (overrides keyring and profile)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TUNSOLE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "TUNSOLE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a token with the daemon and store it
    Login(LoginArgs),

    /// Forget the stored token for the profile
    Logout,

    /// Device, engine and proxy summary
    #[command(alias = "st")]
    Status,

    /// List, add and delete tunnel routes
    #[command(alias = "r")]
    Routes(RoutesArgs),

    /// Show or change the upstream proxy
    Proxy(ProxyArgs),

    /// Follow live state until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Login ────────────────────────────────────────────────────────────

/// The token comes from the global `--token`, or a prompt when omitted.
#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Validate only; do not write the token to the keyring
    #[arg(long)]
    pub no_store: bool,
}

// ── Routes ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RoutesArgs {
    #[command(subcommand)]
    pub command: RoutesCommand,
}

#[derive(Debug, Subcommand)]
pub enum RoutesCommand {
    /// List routes installed on the TUN device
    #[command(alias = "ls")]
    List,

    /// Send a network through the tunnel
    Add {
        /// Destination, e.g. 10.0.0.0/8 or a bare address (becomes /32)
        cidr: String,

        /// Gateway address (defaults to the TUN device address)
        #[arg(long, short = 'g')]
        gateway: Option<String>,

        /// Route metric, lower wins
        #[arg(long, short = 'm')]
        metric: Option<u32>,

        /// Show the composed route without submitting it
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a route
    #[command(alias = "rm")]
    Delete {
        /// Destination of the route to remove
        cidr: String,
    },
}

// ── Proxy ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProxyArgs {
    #[command(subcommand)]
    pub command: ProxyCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProxyCommand {
    /// Show the configured upstream proxy
    Show,

    /// Replace the upstream proxy
    Set {
        /// Proxy protocol
        #[arg(long = "type", short = 't', default_value = "socks5")]
        proxy_type: ProxyKind,

        /// Proxy address as host:port
        #[arg(long, short = 'a')]
        address: String,

        /// Username for authenticated proxies
        #[arg(long, short = 'u')]
        username: Option<String>,

        /// Password (prompted when a username is given without one)
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProxyKind {
    Socks5,
    Socks4,
    Http,
    Https,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Resources to follow (repeatable; default: all)
    #[arg(long, short = 'r', value_delimiter = ',')]
    pub resource: Vec<ResourceArg>,

    /// Poll only; do not open the service event stream
    #[arg(long)]
    pub no_push: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceArg {
    Device,
    Service,
    Proxy,
    Routes,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or update a profile (interactive unless --yes)
    Init {
        /// Profile name
        #[arg(long)]
        name: Option<String>,

        /// Daemon URL for the profile
        #[arg(long = "url")]
        url: Option<String>,

        /// Disable the service event stream for this profile
        #[arg(long)]
        no_push: bool,
    },

    /// Print the configuration with secrets masked
    Show,

    /// Print the config file location
    Path,

    /// Store a token in the system keyring for the profile
    SetToken {
        /// Token value (prompted when omitted)
        #[arg(value_name = "TOKEN")]
        value: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
