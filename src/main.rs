//! Efemérides bot binary entrypoint.
//! One invocation per scheduler tick: load config, run the engine once, exit.
//!
//! Exit code 0 for every normal outcome (published, deferred, nothing to
//! publish); 1 when the run failed.

use std::process::ExitCode;

use efemerides_bot::analyze::Lexicons;
use efemerides_bot::config::{BotConfig, Secrets};
use efemerides_bot::metrics::{set_run_outcome, Metrics};
use efemerides_bot::{App, Outcome};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins; otherwise `efemerides_bot=info,warn`.
/// `EFEMERIDES_LOG_JSON=1` switches to JSON lines for log shippers.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("efemerides_bot=info,warn"));
    let json = std::env::var("EFEMERIDES_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn run() -> anyhow::Result<Outcome> {
    let config = BotConfig::load_default()?;
    let lexicons = Lexicons::load_default()?;
    let secrets = Secrets::from_env();
    info!(
        timezone = %config.bot.timezone,
        dry_run = config.bot.dry_run,
        verify = config.verification_active(),
        ?secrets,
        "configuration loaded"
    );

    let app = App::from_config(config, lexicons, &secrets)?;
    let today = app.today()?;
    app.engine().run_once(today).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let code = match run().await {
        Ok(outcome) => {
            info!(?outcome, "run finished");
            set_run_outcome(outcome.code());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = ?e, "run failed");
            set_run_outcome(-1);
            ExitCode::FAILURE
        }
    };

    if let Some(m) = metrics {
        if let Err(e) = m.export_from_env() {
            warn!(error = %e, "metrics textfile not written");
        }
    }
    code
}
