use anyhow::Result;
use soteria::config::Config;
use soteria::control::ControlGuard;
use soteria::ecoflow::EcoflowClient;
use soteria::notify::{AlertChannel, EmailChannel, LineChannel, Notifier};
use soteria::store::JsonStore;
use soteria::supervisor::Supervisor;
use soteria::switchbot::SwitchbotClient;
use soteria::web::{AppState, serve};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;

    soteria::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    info!("Soteria charging supervisor starting up");

    let store = Arc::new(
        JsonStore::open(&config.store.path)
            .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?,
    );

    let station = Arc::new(
        EcoflowClient::new(
            config.ecoflow.access_key.clone(),
            config.ecoflow.secret_key.clone(),
            config.ecoflow.device_sn.clone(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to build EcoFlow client: {}", e))?,
    );
    let plug = Arc::new(
        SwitchbotClient::new(config.switchbot.token.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build SwitchBot client: {}", e))?,
    );

    let channels: Vec<Box<dyn AlertChannel>> = vec![
        Box::new(LineChannel::new(config.notify.line_token.clone())?),
        Box::new(EmailChannel::new(
            config.notify.resend_api_key.clone(),
            config.notify.email_from.clone(),
            config.notify.email_to.clone(),
        )?),
    ];
    let notifier = Notifier::new(store.clone(), channels);

    let supervisor = Arc::new(Supervisor::new(
        config.clone(),
        store.clone(),
        station,
        plug.clone(),
        notifier,
    ));
    let guard = Arc::new(ControlGuard::new(config.clone(), store.clone(), plug));

    // Web server
    let state = AppState {
        supervisor: supervisor.clone(),
        guard,
        store,
        cron_secret: config.web.cron_secret.clone(),
        control_pin: config.web.control_pin.clone(),
    };
    let host = config.web.host.clone();
    let port = config.web.port;
    let _web_task = tokio::spawn(async move {
        if let Err(e) = serve(state, &host, port).await {
            error!("Web server error: {}", e);
        }
    });

    // Scheduler: one poll cycle per tick; the supervisor's cycle lock keeps
    // the HTTP trigger and this loop from overlapping
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
        config.poll_interval_secs,
    ));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match supervisor.run_poll().await {
            Ok(result) if result.fail_safe_triggered => info!(
                "Poll cycle fail-safe triggered: {}",
                result.reason.as_deref().unwrap_or("unknown")
            ),
            Ok(result) if !result.ok => info!(
                "Poll cycle failed (count={}): {}",
                result.poll_failure_count.unwrap_or_default(),
                result.reason.as_deref().unwrap_or("unknown")
            ),
            Ok(_) => {}
            // A broken store surfaces here; keep the scheduler alive and retry
            Err(e) => error!("Poll cycle error: {}", e),
        }
    }
}
