//! `depot-worker` -- long-poll job worker.
//!
//! Asks the dispatch server for jobs of one application, runs a command
//! per job and reports completion.
//!
//! # Environment variables
//!
//! | Variable               | Required | Default | Description                              |
//! |------------------------|----------|---------|------------------------------------------|
//! | `DEPOT_HOST`           | yes      | --      | Server URL, e.g. `https://10.0.0.1`      |
//! | `DEPOT_PORT`           | no       | `6883`  | Server port                              |
//! | `DEPOT_ACCESS_KEY`     | no       | --      | Basic-auth user                          |
//! | `DEPOT_SECRET_KEY`     | no       | --      | Basic-auth password                      |
//! | `DEPOT_SSL_VERIFY`     | no       | `true`  | Verify the server certificate            |
//! | `APP_ID`               | yes      | --      | Application whose jobs are processed     |
//! | `JOB_COMMAND`          | yes      | --      | Command run per job (job JSON on stdin)  |
//! | `REQUEST_TIMEOUT_SECS` | no       | `30`    | Long-poll hold per request (`-1`: none)  |
//! | `JOB_TIMEOUT_SECS`     | no       | `120`   | Handle timeout and command time limit    |
//! | `IDLE_DELAY_SECS`      | no       | `5`     | Pause after errors                       |

use depot_client::{ClientConfig, DispatchClient};
use depot_worker::config::WorkerConfig;
use depot_worker::runner;
use tokio_util::sync::CancellationToken;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// HTTP-stack crates are held at `warn` so per-connection chatter stays out.
const DEFAULT_LOG_FILTER: &str =
    "depot_worker=info,depot_client=info,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let client_config = ClientConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid dispatch client configuration");
        std::process::exit(1);
    });

    let worker_config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid worker configuration");
        std::process::exit(1);
    });

    let span = tracing::info_span!("dispatch_client", app_id = %worker_config.app_id);
    let client = DispatchClient::with_span(client_config, span).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to create dispatch client");
        std::process::exit(1);
    });

    tracing::info!(
        base_url = %client.base_url(),
        app_id = %worker_config.app_id,
        request_timeout = worker_config.request_timeout,
        job_timeout_secs = worker_config.job_timeout_secs,
        "Starting depot-worker",
    );

    match client.check_status().await {
        Ok(true) => tracing::info!("Dispatch server is healthy"),
        Ok(false) => {
            tracing::error!("Dispatch server reported unhealthy status");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "Dispatch server unreachable");
            std::process::exit(1);
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            ctrl_c_cancel.cancel();
        }
    });

    runner::run(&client, &worker_config, &cancel).await;
    client.close();
}
