//! curlink - command line client for the cu.rl URL shortener.
//!
//! Every invocation starts like the web app does: restore the stored session
//! or bootstrap a guest, then run one command against the API.

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use curlink_core::auth::{AuthCoordinator, Navigation};
use curlink_core::models::{Credentials, PasswordResetConfirm, Registration};
use curlink_core::{ApiError, Config};

/// Log file name prefix inside the cache directory
const LOG_FILE_NAME: &str = "curlink.log";

/// Environment variable read before prompting for a password
const PASSWORD_ENV: &str = "CURLINK_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "curlink", version, about = "Shorten links and manage your cu.rl account")]
struct Cli {
    /// Also write logs to a daily file in the cache directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current user
    Whoami {
        /// Ask the server instead of trusting the stored session
        #[arg(long)]
        remote: bool,
    },
    /// Log in; links created as a guest move to the account
    Login {
        #[arg(long)]
        username: Option<String>,
    },
    /// Log out and continue as a new guest
    Logout,
    /// Create an account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// Shorten a URL
    Shorten {
        url: String,
        /// Custom slug (registered users only)
        #[arg(long)]
        slug: Option<String>,
    },
    /// List your links
    List,
    /// Delete one of your links
    Delete { uuid: String },
    /// Click statistics for one of your links
    Analytics { uuid: String },
    /// Show where a slug points
    Resolve { slug: String },
    /// Email a password reset link
    ForgotPassword { email: String },
    /// Set a new password from a reset link
    ResetPassword { uid: String, token: String },
    /// Permanently delete your account
    DeleteAccount {
        #[arg(long)]
        yes: bool,
    },
    /// Check that the API is reachable
    Health,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();
    guard
}

fn read_password(prompt: &str) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password(prompt).context("Failed to read password")
}

fn read_new_password() -> Result<(String, String)> {
    let password = rpassword::prompt_password("New password: ").context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
    Ok((password, confirm))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    let log_dir = if cli.log_file {
        Some(config.cache_dir()?)
    } else {
        None
    };
    let _guard = init_tracing(log_dir);
    info!(backend = %config.backend_url(), "curlink starting");

    let api = config.api_client()?;
    let auth = AuthCoordinator::new(api);
    auth.initialize().await;
    let mut navigation = auth.navigation();
    let mut failures = auth.api().subscribe_auth_failures();

    let result = run(cli.command, &auth, &mut config).await;
    let expired = matches!(
        result.as_ref().err().and_then(|e| e.downcast_ref::<ApiError>()),
        Some(ApiError::SessionExpired)
    );
    if expired && failures.try_recv().is_ok() {
        // Let the forced logout finish before the runtime shuts down
        match tokio::time::timeout(config.request_timeout(), navigation.recv()).await {
            Ok(Ok(Navigation::Landing)) => debug!("Forced logout finished"),
            _ => warn!("Forced logout did not finish before exit"),
        }
    }
    result
}

async fn run(command: Command, auth: &AuthCoordinator, config: &mut Config) -> Result<()> {
    let api = auth.api();

    match command {
        Command::Whoami { remote } => {
            let user = if remote {
                api.current_user().await
            } else {
                auth.current_user()
            };
            match user {
                Some(user) => println!(
                    "{} ({}){}",
                    user.display_name(),
                    user.user_type.display_name(),
                    user.email.as_ref().map(|e| format!(" <{}>", e)).unwrap_or_default()
                ),
                None => println!("Not signed in"),
            }
        }
        Command::Login { username } => {
            let username = match username.or_else(|| config.last_username.clone()) {
                Some(username) => username,
                None => bail!("--username is required"),
            };
            let password = read_password("Password: ")?;
            let user = auth.login(&Credentials::new(username.clone(), password)).await?;
            config.last_username = Some(username);
            config.save()?;
            println!("Logged in as {}", user.username);
        }
        Command::Logout => {
            auth.logout().await;
            match auth.current_user() {
                Some(_) => println!("Logged out; continuing as guest"),
                None => println!("Logged out"),
            }
        }
        Command::Register { username, email } => {
            let (password, confirm_password) = read_new_password()?;
            auth.register(&Registration {
                username: username.clone(),
                email,
                password,
                confirm_password,
            })
            .await?;
            println!("Account {} created. Log in with `curlink login --username {}`", username, username);
        }
        Command::Shorten { url, slug } => {
            let link = api.shorten(&url, slug.as_deref()).await?;
            println!("{}", link.short_link(&config.short_link_base()));
        }
        Command::List => {
            let links = api.list_urls().await?;
            if links.is_empty() {
                println!("No links yet");
            }
            let base = config.short_link_base();
            for link in links {
                let status = if link.is_accessible() { "" } else { "  (inactive)" };
                println!(
                    "{}  {}  {}  {}{}",
                    link.uuid,
                    link.creation_date.format("%b %d, %Y"),
                    link.short_link(&base),
                    link.original_url,
                    status
                );
            }
        }
        Command::Delete { uuid } => {
            api.delete_url(&uuid).await?;
            println!("Deleted {}", uuid);
        }
        Command::Analytics { uuid } => {
            let stats = api.url_analytics(&uuid).await?;
            let list = |values: &[Option<String>]| {
                values
                    .iter()
                    .map(|v| v.as_deref().unwrap_or("Unknown"))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            println!("Clicks:     {}", stats.total_clicks);
            println!(
                "Redirected: {} ({:.0}%)",
                stats.successful_redirects,
                stats.success_rate()
            );
            println!("Failed:     {}", stats.failed_redirects);
            println!("Countries:  {}", list(&stats.countries));
            println!("Browsers:   {}", list(&stats.browsers));
            println!("Platforms:  {}", list(&stats.platforms));
            println!("Devices:    {}", list(&stats.devices));
        }
        Command::Resolve { slug } => {
            let redirect = api.resolve(&slug).await?;
            println!("{}", redirect.original_url);
        }
        Command::ForgotPassword { email } => {
            api.forgot_password(&email).await?;
            println!("If {} has an account, a reset link is on its way", email);
        }
        Command::ResetPassword { uid, token } => {
            let (new_password1, new_password2) = read_new_password()?;
            api.reset_password_confirm(&PasswordResetConfirm {
                uid,
                token,
                new_password1,
                new_password2,
            })
            .await?;
            println!("Password changed. Log in with your new password");
        }
        Command::DeleteAccount { yes } => {
            if !yes {
                bail!("Refusing to delete the account without --yes");
            }
            auth.delete_account().await?;
            println!("Account deleted");
        }
        Command::Health => {
            let healthy = api.health().await?;
            debug!(healthy, "Health check finished");
            if !healthy {
                bail!("API at {} is unhealthy", api.base_url());
            }
            println!("ok");
        }
    }

    Ok(())
}
