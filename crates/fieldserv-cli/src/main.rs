//! fieldserv - command-line access to a field-service account.
//!
//! Signs in against the API, keeps the session in the configured credential
//! store, and lists or removes company, member, client, business and task
//! records.

use std::fmt::Debug;
use std::io;

use anyhow::{anyhow, bail, Result};
use futures::{FutureExt, StreamExt};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fieldserv_core::api::ReqwestTransport;
use fieldserv_core::models::{Business, Client, Company, Member, Resource, Task};
use fieldserv_core::services::{AuthService, RecordService};
use fieldserv_core::{ApiClient, Config, RemoteOutcome};

/// Log file name prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "fieldserv.log";

const USAGE: &str = "\
Usage: fieldserv <command>

Commands:
  login [phone]            Sign in (prompts for the password)
  logout                   Sign out and erase stored tokens
  status                   Show whether a session is stored
  list <kind>              List records
  get <kind> <id>          Show one record
  delete <kind> <id>       Delete one record

Kinds: companies, members, clients, businesses, tasks";

type HttpClient = ApiClient<ReqwestTransport>;

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and to a daily rolling file in the cache directory.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    config.apply_env();
    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };

    let store = config.open_store()?;
    let client = ApiClient::from_config(&config, store.clone())?;
    info!(base_url = config.base_url(), command, "fieldserv starting");

    // Watch the store so a session ended by the server is reported.
    let mut changes = Box::pin(store.observe());
    let was_logged_in = changes.next().await.map(|c| c.is_logged_in).unwrap_or(false);

    let result = match (command, &args[1..]) {
        ("login", rest) => login(&client, &mut config, rest.first().cloned()).await,
        ("logout", _) => {
            AuthService::new(client.clone()).logout()?;
            println!("Signed out.");
            return Ok(());
        }
        ("status", _) => {
            status(&client);
            Ok(())
        }
        ("list", [kind]) => dispatch(&client, kind, Action::List).await,
        ("get", [kind, id]) => dispatch(&client, kind, Action::Get(id)).await,
        ("delete", [kind, id]) => dispatch(&client, kind, Action::Delete(id)).await,
        _ => {
            println!("{}", USAGE);
            Ok(())
        }
    };

    if let Some(Some(latest)) = changes.next().now_or_never() {
        if was_logged_in && !latest.is_logged_in {
            eprintln!("Your session has expired. Run `fieldserv login` to sign in again.");
        }
    }

    result
}

async fn login(client: &HttpClient, config: &mut Config, phone: Option<String>) -> Result<()> {
    let phone = match phone.or_else(|| config.last_phone.clone()) {
        Some(phone) => phone,
        None => bail!("Usage: fieldserv login <phone>"),
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", phone))?;

    into_result(AuthService::new(client.clone()).login(&phone, &password).await)?;

    config.last_phone = Some(phone.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Signed in as {}.", phone);
    Ok(())
}

fn status(client: &HttpClient) {
    let credential = client.store().get();
    if credential.is_logged_in {
        let renewable = if credential.refresh_token.is_empty() { "no" } else { "yes" };
        println!("Signed in (renewable: {}).", renewable);
    } else {
        println!("Not signed in.");
    }
}

enum Action<'a> {
    List,
    Get(&'a str),
    Delete(&'a str),
}

async fn dispatch(client: &HttpClient, kind: &str, action: Action<'_>) -> Result<()> {
    match kind {
        "companies" => run::<Company>(client, action).await,
        "members" => run::<Member>(client, action).await,
        "clients" => run::<Client>(client, action).await,
        "businesses" => run::<Business>(client, action).await,
        "tasks" => run::<Task>(client, action).await,
        other => bail!("Unknown record kind: {}", other),
    }
}

async fn run<R: Resource + Debug>(client: &HttpClient, action: Action<'_>) -> Result<()> {
    let service = RecordService::<_, R>::new(client.clone());
    match action {
        Action::List => {
            let records = into_result(service.list().await)?;
            if records.is_empty() {
                println!("No {}.", R::NAME);
            }
            for record in records {
                println!("{:<24} {}", record.id().unwrap_or("-"), record.summary());
            }
        }
        Action::Get(id) => {
            let record = into_result(service.get(id).await)?;
            println!("{:#?}", record);
        }
        Action::Delete(id) => {
            into_result(service.delete(id).await)?;
            println!("Deleted {}.", id);
        }
    }
    Ok(())
}

/// Surface a failed outcome with its user-facing message.
fn into_result<T>(outcome: RemoteOutcome<T>) -> Result<T> {
    match outcome {
        RemoteOutcome::Success { value } => Ok(value),
        RemoteOutcome::Failure { message, .. } => Err(anyhow!(message)),
    }
}
