use std::time::Duration;

use clap::Parser;
use reqwest::Method;

use microservice_template::config::BreakerConfig;
use microservice_template::observability::logging;
use microservice_template::resilience::{CircuitBreaker, OutboundRequest, ReqwestExecutor};

#[derive(Parser)]
#[command(name = "breaker-probe")]
#[command(about = "Send repeated requests through a circuit breaker and report each outcome", long_about = None)]
struct Cli {
    /// Target URL.
    #[arg(short, long)]
    url: String,

    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Number of calls to make.
    #[arg(short = 'n', long, default_value_t = 10)]
    count: u32,

    /// Pause between calls in milliseconds.
    #[arg(short, long, default_value_t = 500)]
    interval_ms: u64,

    #[arg(long, default_value_t = 3)]
    failure_threshold: u32,

    #[arg(long, default_value_t = 30)]
    cooldown_secs: u64,

    #[arg(long, default_value_t = 1)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init("info");

    let method = Method::from_bytes(cli.method.to_uppercase().as_bytes())?;
    let config = BreakerConfig {
        failure_threshold: cli.failure_threshold,
        cooldown_secs: cli.cooldown_secs,
        timeout_secs: cli.timeout_secs,
    };
    let breaker = CircuitBreaker::new(&config, ReqwestExecutor::default());

    for attempt in 1..=cli.count {
        let request = OutboundRequest::new(method.clone(), cli.url.as_str());
        let endpoint = request.endpoint_key();

        let outcome = match breaker.try_call_service(request).await {
            Ok(payload) => format!("ok {}", serde_json::to_string(&payload)?),
            Err(e) => format!("no data ({})", e),
        };

        if let Some(state) = breaker.state(&endpoint) {
            println!(
                "#{:<3} {:<9} failures={:<3} {}",
                attempt, state.status.to_string(), state.failures, outcome
            );
        }

        if attempt < cli.count {
            tokio::time::sleep(Duration::from_millis(cli.interval_ms)).await;
        }
    }

    Ok(())
}
