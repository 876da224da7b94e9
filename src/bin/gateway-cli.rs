use std::path::{Path, PathBuf};

use axum::http::{Method, Uri};
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use api_gateway::config::{load_config, ConfigError};
use api_gateway::dispatch::dispatcher::downstream_uri;
use api_gateway::routing::{Lookup, RouteTable};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the API gateway", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key.
    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file without starting the gateway
    Check { config: PathBuf },
    /// Show which route a request would take and where it would be sent
    Match {
        config: PathBuf,
        method: String,
        /// Path with optional query, e.g. /api/users/42?expand=true
        path: String,
    },
    /// Check gateway status
    Status,
    /// List the active route table
    Routes,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Match { config, method, path } => match_request(&config, &method, &path),
        Commands::Status => admin_get(&cli.url, &cli.key, "/admin/status").await,
        Commands::Routes => admin_get(&cli.url, &cli.key, "/admin/routes").await,
    }
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match load_config(path) {
        Ok(config) => {
            println!("{}: OK ({} routes)", path.display(), config.routes.len());
            Ok(())
        }
        Err(ConfigError::Validation(errors)) => {
            eprintln!("{}: {} problem(s)", path.display(), errors.len());
            for error in &errors {
                eprintln!("  - {}", error);
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn match_request(path: &Path, method: &str, target: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let table = RouteTable::build(&config.routes, 0).map_err(|errors| {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    })?;

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
    let uri: Uri = target.parse()?;

    match table.lookup(&method, uri.path()) {
        Lookup::Matched(found) => {
            let route = found.route();
            let downstream = downstream_uri(route, &found.downstream_path(), uri.query())?;
            let params: Vec<String> = found.params().iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            println!("route:         {}", route.name());
            println!("downstream:    {} {}", method, downstream);
            println!("params:        {}", params.join(", "));
            println!("auth_required: {}", route.auth_required());
            if !route.required_scopes().is_empty() {
                println!("scopes:        {}", route.required_scopes().join(", "));
            }
            println!("timeout:       {}ms, retries: {}", route.timeout().as_millis(), route.retries());
        }
        Lookup::MethodNotAllowed(allowed) => {
            println!("405 Method Not Allowed (allow: {})", allowed.join(", "));
        }
        Lookup::NotFound => println!("404 Not Found: no route for {} {}", method, uri.path()),
    }
    Ok(())
}

async fn admin_get(base: &str, key: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let res = reqwest::Client::new()
        .get(format!("{}{}", base.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
