//! Dockhand Core - Entry Point
//!
//! Orchestrates image builds and container deployments across the periphery
//! agents of a server fleet.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use dockhand::app::options::AppOptions;
use dockhand::app::run::run;
use dockhand::app::state::Collections;
use dockhand::authn::token::JwtAuthority;
use dockhand::errors::CoreError;
use dockhand::filesys::file::File;
use dockhand::logs::{init_logging, LogOptions};
use dockhand::storage::layout::StorageLayout;
use dockhand::storage::settings::Settings;
use dockhand::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Retrieve the settings file
    let (layout, settings_file) = match cli_args.get("config") {
        Some(path) => {
            let path = PathBuf::from(path);
            let base_dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (StorageLayout::new(base_dir), File::new(path))
        }
        None => {
            let layout = StorageLayout::default();
            let settings_file = layout.settings_file();
            (layout, settings_file)
        }
    };
    let settings = match settings_file.read_json::<Settings>().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!(
                "Unable to read settings file {}: {e}",
                settings_file.path().display()
            );
            return;
        }
    };
    if let Err(e) = settings.validate() {
        eprintln!("Invalid settings: {e}");
        return;
    }

    // Issue a user token and exit
    if let Some(user_id) = cli_args.get("issue-token") {
        match issue_token(&layout, &settings, user_id).await {
            Ok(token) => println!("{token}"),
            Err(e) => eprintln!("Unable to issue token: {e}"),
        }
        return;
    }

    // Initialize logging; the guard flushes file logs on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.as_deref().map(|dir| layout.resolve(dir)),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    // Run the core
    let options = AppOptions::from_settings(layout, &settings);
    info!(
        "Running dockhand core {} on {}:{}",
        version.version, options.server.host, options.server.port
    );
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the core: {e}");
    }
}

/// Sign a token for an existing user
async fn issue_token(
    layout: &StorageLayout,
    settings: &Settings,
    user_id: &str,
) -> Result<String, CoreError> {
    let known = match &settings.data_dir {
        Some(data_dir) => {
            let collections = Collections::open(layout, data_dir).await?;
            collections.users.get(user_id).await?.is_some()
        }
        None => false,
    };
    let bootstrap = settings
        .bootstrap_admin
        .as_ref()
        .is_some_and(|admin| admin.id == user_id);
    if !known && !bootstrap {
        return Err(CoreError::ResourceNotFound(format!("user {}", user_id)));
    }
    JwtAuthority::new(settings.jwt_secret.clone(), settings.jwt_ttl_secs).issue(user_id)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {e}");
                }
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
