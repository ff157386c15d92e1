mod cli;
pub mod render;
mod watch;

use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use activity_feed_api::TaskCommentFeed;
use activity_feed_client::ReqwestTransport;
use activity_feed_core::Config;
use activity_feed_core::ConfigOverrides;
use activity_feed_core::FeedLoader;
use activity_feed_core::FeedPhase;
use activity_feed_core::FeedSession;
use activity_feed_core::TokenAuth;
use activity_feed_core::auth;
use activity_feed_core::config::find_feed_home;
use activity_feed_core::config::parse_override;
use anyhow::Context;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub use crate::cli::Cli;
pub use crate::cli::Color;
pub use crate::cli::Command;
pub use crate::cli::ListCommand;
pub use crate::cli::LoginCommand;
use crate::render::Renderer;

pub async fn run_main(cli: Cli) -> anyhow::Result<ExitCode> {
    let Cli {
        config_overrides,
        base_url,
        board_id,
        limit,
        color,
        command,
    } = cli;

    let (stdout_with_ansi, stderr_with_ansi) = match color {
        Color::Always => (true, true),
        Color::Never => (false, false),
        Color::Auto => (
            supports_color::on_cached(Stream::Stdout).is_some(),
            supports_color::on_cached(Stream::Stderr).is_some(),
        ),
    };
    init_logging(stderr_with_ansi);

    let feed_home = find_feed_home().context("failed to locate the activity feed home")?;

    match command {
        Command::Login(cmd) => run_login(&feed_home, cmd),
        Command::Logout => run_logout(&feed_home),
        Command::List(cmd) => {
            let config = load_config(feed_home, config_overrides, base_url, board_id, limit)?;
            run_list(&config, cmd, Renderer::new(stdout_with_ansi)).await
        }
        Command::Watch => {
            let config = load_config(feed_home, config_overrides, base_url, board_id, limit)?;
            let session = build_session(&config)?;
            watch::run_watch(session, Renderer::new(stdout_with_ansi)).await
        }
    }
}

fn init_logging(with_ansi: bool) {
    let default_level = "error";
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(with_ansi)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

fn load_config(
    feed_home: PathBuf,
    raw_overrides: Vec<String>,
    base_url: Option<String>,
    board_id: Option<String>,
    limit: Option<u32>,
) -> anyhow::Result<Config> {
    let cli_overrides = raw_overrides
        .iter()
        .map(String::as_str)
        .map(parse_override)
        .collect::<Result<Vec<_>, _>>()?;
    let overrides = ConfigOverrides {
        base_url,
        board_id,
        limit,
    };
    Ok(Config::load(feed_home, cli_overrides, overrides)?)
}

type CliSession = FeedSession<ReqwestTransport, Arc<TokenAuth>>;

fn build_session(config: &Config) -> anyhow::Result<CliSession> {
    let auth = Arc::new(TokenAuth::from_config(config));
    let loader = FeedLoader::from_config(config, Arc::clone(&auth))
        .context("failed to build the HTTP client")?;
    Ok(FeedSession::new(loader, auth))
}

async fn run_list(
    config: &Config,
    cmd: ListCommand,
    renderer: Renderer,
) -> anyhow::Result<ExitCode> {
    let session = build_session(config)?;
    let view = session.load_once().await;
    let mut stdout = std::io::stdout().lock();

    match view.phase() {
        FeedPhase::Loaded(items) if cmd.json => {
            let feed = TaskCommentFeed {
                items: items.to_vec(),
            };
            writeln!(stdout, "{}", serde_json::to_string_pretty(&feed)?)?;
        }
        _ => renderer.write_view(&view, &mut stdout)?,
    }

    Ok(match view.phase() {
        FeedPhase::Loaded(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn run_login(feed_home: &Path, cmd: LoginCommand) -> anyhow::Result<ExitCode> {
    let token = match cmd.token {
        Some(token) => token,
        None if cmd.with_token => {
            let mut token = String::new();
            std::io::stdin()
                .read_to_string(&mut token)
                .context("failed to read token from stdin")?;
            token
        }
        None => anyhow::bail!("pass --token <TOKEN> or pipe one with --with-token"),
    };

    let path = auth::auth_file(feed_home);
    auth::save_auth(feed_home, &token)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Saved token to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn run_logout(feed_home: &Path) -> anyhow::Result<ExitCode> {
    let path = auth::auth_file(feed_home);
    if auth::logout(feed_home).with_context(|| format!("failed to remove {}", path.display()))? {
        println!("Removed {}", path.display());
    } else {
        println!("Not logged in.");
    }
    Ok(ExitCode::SUCCESS)
}
