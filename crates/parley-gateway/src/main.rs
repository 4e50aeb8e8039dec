use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use parley_core::config::ParleyConfig;
use parley_core::types::session_path;
use parley_gcp::{DialogflowResolver, ServiceAccountAuth, SubscriptionClient};
use parley_messenger::{Dispatcher, GraphSender};
use tracing::{info, warn};

mod app;
mod http;
mod listener;
mod relay;

use listener::{ListenerHandle, ListenerSettings};
use relay::RelayHandler;

/// Relay Messenger events from Pub/Sub through Dialogflow and back.
#[derive(Parser, Debug)]
#[command(name = "parley-gateway", version, about)]
struct Args {
    /// Config file (default: ~/.parley/parley.toml).
    #[arg(long, env = "PARLEY_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_gateway=info,parley_gcp=info,parley_messenger=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();
    let config = ParleyConfig::load(args.config.as_deref()).context("loading config")?;

    let pubsub_auth = load_key("pubsub", &config.pubsub.key_file, &config.pubsub.project_id)?;
    let dialogflow_auth = load_key(
        "dialogflow",
        &config.dialogflow.key_file,
        &config.dialogflow.project_id,
    )?;

    let subscription = SubscriptionClient::new(
        &config.pubsub.api_base,
        &config.pubsub.project_id,
        &config.pubsub.subscription,
        pubsub_auth,
    );
    info!(subscription = subscription.subscription_path(), "subscription configured");

    let resolver = DialogflowResolver::new(&config.dialogflow.api_base, dialogflow_auth);
    let sender = GraphSender::new(
        &config.messenger.graph_base,
        &config.messenger.api_version,
        config.messenger.page_access_token.clone(),
    );
    info!(endpoint = sender.endpoint(), "send api configured");

    let relay = RelayHandler::new(
        Arc::new(resolver),
        Dispatcher::new(Arc::new(sender), config.messenger.text_lines),
        session_path(&config.dialogflow.project_id, &config.dialogflow.session_id),
        config.dialogflow.language_code.clone(),
    );

    let listener = ListenerHandle::new(
        Arc::new(subscription),
        Arc::new(relay),
        ListenerSettings {
            max_messages: config.pubsub.max_messages,
            error_pause: Duration::from_millis(config.pubsub.error_pause_ms),
        },
    );
    if config.pubsub.attach_on_start {
        listener.attach().await;
    } else {
        info!("listener starts detached; call /restore-listener to attach");
    }

    if config.gateway.control_token.is_none() {
        warn!("gateway.control_token is not set: listener control endpoints are unauthenticated");
    }

    let state = Arc::new(app::AppState::new(
        config.gateway.control_token.clone(),
        listener,
    ));
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("Parley gateway listening on {}", addr);

    let tcp = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(tcp, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.listener.detach().await;
    info!("shutdown complete");
    Ok(())
}

/// Load a service account key, warning when it belongs to another project.
fn load_key(
    purpose: &str,
    key_file: &str,
    project_id: &str,
) -> anyhow::Result<Arc<ServiceAccountAuth>> {
    let auth = ServiceAccountAuth::from_file(key_file)
        .with_context(|| format!("loading {purpose} service account key"))?;
    if let Some(key_project) = auth.project_id() {
        if key_project != project_id {
            warn!(
                purpose,
                key_project,
                configured = project_id,
                "service account key belongs to a different project"
            );
        }
    }
    info!(purpose, account = auth.client_email(), "service account loaded");
    Ok(Arc::new(auth))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
