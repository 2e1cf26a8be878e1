//! Clap derive structures for the `teamslink` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Args, Parser, Subcommand, ValueEnum};
use strum::IntoEnumIterator;
use teamslink_core::Reaction;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// teamslink -- drive a running Teams meeting from the command line
#[derive(Debug, Parser)]
#[command(
    name = "teamslink",
    version,
    about = "Control Microsoft Teams meetings through the local device API",
    long_about = "Talks to the third-party device API that the Teams desktop client\n\
        exposes on localhost. Pair once with `teamslink pair`, then toggle mute,\n\
        camera, reactions and more from scripts, hotkeys or stream decks.",
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
    /// Local API port (overrides config; 0 means 8124)
    #[arg(long, env = "TEAMSLINK_PORT", global = true)]
    pub port: Option<u16>,

    /// Pairing token (overrides keyring and config)
    #[arg(long, env = "TEAMSLINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Seconds to wait for the connection and the reply
    #[arg(long, short = 't', default_value = "5", global = true)]
    pub timeout: u64,

    /// Seconds a command may wait for queue space (0 fails immediately)
    #[arg(long, global = true)]
    pub send_timeout: Option<u64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TEAMSLINK_OUTPUT",
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
}

impl GlobalOpts {
    /// Tracing directives for `-q` / `-v` when `RUST_LOG` is unset.
    ///
    /// `-v` and `-vv` raise only the teamslink crates; `-vvv` also opens up
    /// the WebSocket and runtime dependencies.
    pub fn log_filter(&self) -> String {
        const CRATES: [&str; 4] = [
            "teamslink",
            "teamslink_core",
            "teamslink_api",
            "teamslink_config",
        ];
        let ours = match (self.quiet, self.verbose) {
            (true, _) => return "error".to_owned(),
            (false, 0) => return "warn".to_owned(),
            (false, 1) => "info",
            (false, 2) => "debug",
            (false, _) => return "trace".to_owned(),
        };
        CRATES
            .iter()
            .fold(String::from("warn"), |filter, krate| format!("{filter},{krate}={ours}"))
    }
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON (one object per line for `watch`)
    JsonCompact,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
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
    /// Toggle the microphone
    #[command(alias = "m")]
    Mute,

    /// Toggle the camera
    #[command(alias = "camera")]
    Video,

    /// Toggle background blur
    Blur,

    /// Raise or lower your hand
    Hand,

    /// Open or close the chat panel
    Chat,

    /// Open or close the share tray
    ShareTray,

    /// Stop sharing your screen
    StopSharing,

    /// Leave the current meeting
    Leave,

    /// Send a reaction
    React(ReactArgs),

    /// Print the current meeting state
    State,

    /// Stream meeting updates until interrupted
    Watch,

    /// Pair with Teams and store the issued token
    Pair(PairArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── React ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReactArgs {
    /// Reaction to send
    #[arg(value_parser = reaction_parser())]
    pub reaction: Reaction,
}

/// Accepts the wire names of [`Reaction`] and lists them in help and errors.
fn reaction_parser() -> impl TypedValueParser<Value = Reaction> {
    PossibleValuesParser::new(Reaction::iter().map(|r| r.to_string()))
        .try_map(|name| name.parse::<Reaction>())
}

// ── Pair ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PairArgs {
    /// Seconds to wait for pairing to be allowed in Teams
    #[arg(long, default_value = "60")]
    pub wait: u64,

    /// Print the token instead of storing it in the keyring
    #[arg(long)]
    pub print: bool,

    /// Remove the stored token and exit
    #[arg(long, conflicts_with = "print")]
    pub forget: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// Write a config file populated with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
