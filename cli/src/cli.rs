use clap::Args;
use clap::Parser;
use clap::ValueEnum;

#[derive(Parser, Debug)]
#[command(name = "activity-feed", version, about = "Task comment activity in the terminal.")]
pub struct Cli {
    /// Override a value from config.toml. Values are parsed as TOML and fall
    /// back to plain strings, e.g. `-c limit=20` or
    /// `-c http_headers.x-org=acme`.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "key=value",
        global = true
    )]
    pub config_overrides: Vec<String>,

    /// Dashboard API base URL (default http://localhost:8000).
    #[arg(long = "base-url", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Only show comments from this board.
    #[arg(long = "board", value_name = "BOARD_ID", global = true)]
    pub board_id: Option<String>,

    /// Page size for the initial load.
    #[arg(long = "limit", value_parser = parse_limit, global = true)]
    pub limit: Option<u32>,

    /// Specifies color settings for use in the output.
    #[arg(long = "color", value_enum, default_value_t = Color::Auto, global = true)]
    pub color: Color,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Load the feed once and print it.
    List(ListCommand),
    /// Load the feed and keep printing new comments until Ctrl-C.
    Watch,
    /// Store a bearer token in $ACTIVITY_FEED_HOME/auth.json.
    Login(LoginCommand),
    /// Remove the stored bearer token.
    Logout,
}

#[derive(Debug, Args)]
pub struct ListCommand {
    /// Print the loaded items as JSON instead of cards.
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct LoginCommand {
    /// Bearer token to store.
    #[arg(long = "token", value_name = "TOKEN", conflicts_with = "with_token")]
    pub token: Option<String>,

    /// Read the token from stdin.
    #[arg(long = "with-token", default_value_t = false)]
    pub with_token: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Color {
    Always,
    Never,
    #[default]
    Auto,
}

fn parse_limit(input: &str) -> Result<u32, String> {
    let value: u32 = input
        .parse()
        .map_err(|_| "limit must be a positive integer".to_string())?;
    if value >= 1 {
        Ok(value)
    } else {
        Err("limit must be at least 1".to_string())
    }
}
