use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "monitor-cli")]
#[command(about = "Management CLI for the endpoint monitor", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "MONITOR_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check monitor status
    Status,
    /// List monitored endpoints with their health
    Endpoints,
    /// Show the latest health snapshot of one endpoint
    Health { endpoint: String },
    /// Start (or add a reference to) monitoring an endpoint
    Start {
        endpoint: String,
        /// Freshly provisioned endpoint; opens the grace period
        #[arg(long)]
        new: bool,
        /// Wait for DNS propagation before the first probe
        #[arg(long)]
        deferred: bool,
    },
    /// Release one monitoring reference
    Stop { endpoint: String },
    /// Pause all monitoring
    Pause,
    /// Resume all monitoring
    Resume,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Endpoints => client.get(format!("{}/admin/endpoints", base)),
        Commands::Health { endpoint } => client
            .get(format!("{}/admin/health", base))
            .query(&[("endpoint", endpoint)]),
        Commands::Start {
            endpoint,
            new,
            deferred,
        } => client
            .post(format!("{}/admin/endpoints", base))
            .json(&serde_json::json!({
                "endpoint": endpoint,
                "new": new,
                "deferred": deferred,
            })),
        Commands::Stop { endpoint } => client
            .delete(format!("{}/admin/endpoints", base))
            .query(&[("endpoint", endpoint)]),
        Commands::Pause => client.post(format!("{}/admin/pause", base)),
        Commands::Resume => client.post(format!("{}/admin/resume", base)),
    };

    let res = request.headers(headers).send().await?;
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
