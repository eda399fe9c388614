//! notakey-2fa: operator tool for the Notakey push second factor
//!
//! Checks configuration against the remote service, sends test pushes and
//! evaluates provider policy without going through the host site.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use two_factor_notakey::approval::{AuthRequestLifecycle, AuthState, RequestTemplate};
use two_factor_notakey::audit::SystemAuditSink;
use two_factor_notakey::clock::SystemClock;
use two_factor_notakey::config::{default_provider, ConfigProvider, FileConfigProvider, NotakeyConfig};
use two_factor_notakey::policy::{provider_label, ProviderPolicyEngine, UserContext, Verdict};
use two_factor_notakey::remote::{NasClient, RemoteService};
use two_factor_notakey::user_sync::UserSyncService;

#[derive(Parser)]
#[command(name = "notakey-2fa")]
#[command(about = "Notakey push second factor operator tool")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to NOTAKEY_CONFIG_FILE, then
    /// /etc/two-factor-notakey/config.yaml, then NOTAKEY_* variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and exchange client credentials
    Check,

    /// Send a push request and wait for the answer
    Push {
        /// Login name to authenticate
        login: String,

        /// Seconds between status polls
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },

    /// Remove a user's remote identity
    DeleteUser {
        /// Login name to remove
        login: String,
    },

    /// Evaluate provider policy for a user
    Providers {
        /// Providers offered by the host, comma separated
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,

        /// Providers the user has enabled, comma separated
        #[arg(long, value_delimiter = ',')]
        enabled: Vec<String>,

        /// User being evaluated
        #[arg(long, default_value_t = 1)]
        user_id: u64,

        /// Logged-in user viewing the profile; omit for a login attempt
        #[arg(long)]
        viewer: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("two_factor_notakey=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Check => run_check(&config),
        Commands::Push { login, interval } => run_push(&config, &login, interval),
        Commands::DeleteUser { login } => run_delete_user(&config, &login),
        Commands::Providers {
            candidates,
            enabled,
            user_id,
            viewer,
        } => run_providers(&config, &candidates, &enabled, user_id, viewer),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<NotakeyConfig> {
    let provider: Box<dyn ConfigProvider> = match path {
        Some(path) => Box::new(FileConfigProvider::new(path)),
        None => default_provider(),
    };
    provider.load().context("Failed to load configuration")
}

fn run_check(config: &NotakeyConfig) -> anyhow::Result<()> {
    println!("{:#?}", config);
    println!();
    println!("Request preview: {}", config.request_title);
    println!("                 {}", config.render_message("<login>"));

    let missing = config.missing_remote_fields();
    if !missing.is_empty() {
        bail!("Not ready, missing settings: {}", missing.join(", "));
    }

    let client = NasClient::new(config)?;
    client.authenticate()?;
    println!("Credential exchange with {} succeeded", config.service_url);
    Ok(())
}

fn run_push(config: &NotakeyConfig, login: &str, interval: u64) -> anyhow::Result<()> {
    let remote: Arc<dyn RemoteService> = Arc::new(NasClient::new(config)?);
    let lifecycle = AuthRequestLifecycle::new(
        remote,
        RequestTemplate::from_config(config),
        Arc::new(SystemClock),
        Arc::new(SystemAuditSink::new()),
    );

    let mut request = lifecycle.start(login);
    let Some(id) = request.id().map(str::to_string) else {
        bail!(
            "Push request failed: {}",
            request.last_error().unwrap_or("unknown error")
        );
    };
    info!(request_id = %id, ttl = request.ttl_seconds(), "Push request sent");
    println!("Sent request {} to {}, waiting up to {}s", id, login, request.ttl_seconds());

    let state = loop {
        std::thread::sleep(Duration::from_secs(interval.max(1)));
        let state = lifecycle.poll(&mut request);
        println!("{:?}", state);
        if state.is_terminal() {
            break state;
        }
        if request.last_poll_failed() {
            warn!(error = request.last_error().unwrap_or(""), "Status poll failed, retrying");
        }
    };

    if state != AuthState::Approved {
        bail!("Login would be refused ({:?})", state);
    }
    println!("Login would be allowed");
    Ok(())
}

fn run_delete_user(config: &NotakeyConfig, login: &str) -> anyhow::Result<()> {
    let audit = Arc::new(SystemAuditSink::new());
    let sync = if config.ready() {
        UserSyncService::new(Arc::new(NasClient::new(config)?), audit)
    } else {
        UserSyncService::unconfigured(audit)
    };

    sync.on_user_removed(login);
    println!("Removal of {} processed, see audit log for the outcome", login);
    Ok(())
}

fn run_providers(
    config: &NotakeyConfig,
    candidates: &[String],
    enabled: &[String],
    user_id: u64,
    viewer: Option<u64>,
) -> anyhow::Result<()> {
    let engine = ProviderPolicyEngine::new(config);

    println!("Registered providers:");
    for provider in engine.registered_providers(candidates) {
        println!("  {:<28} {}", provider, provider_label(&provider).unwrap_or("-"));
    }

    let context = UserContext {
        user_id,
        current_user_id: viewer,
    };
    let decision = engine.evaluate(enabled, &context);

    println!("Enabled for user {}:", user_id);
    for provider in &decision.providers {
        println!("  {:<28} {}", provider, provider_label(provider).unwrap_or("-"));
    }

    match decision.verdict {
        Verdict::Continue => {
            println!("Verdict: continue");
            Ok(())
        }
        Verdict::Reject { message } => bail!("Verdict: reject ({})", message),
    }
}
