//! Daemon assembly and operator commands.
//!
//! `run_daemon` wires the database, codec registry, and bus together, then
//! supervises one projector loop per tenant plus the janitor until a
//! shutdown signal arrives. The remaining functions back the operator
//! subcommands (`replay`, `stats`).

use std::sync::Arc;
use std::time::Duration;

use outpost_bus::{HttpBus, HttpBusConfig, MessageBus};
use outpost_codec::{CodecRegistry, PassthroughCodec};
use outpost_config::{Config, Paths};
use outpost_database::{queries, AsyncDatabase};
use outpost_projector::{OutboxProjector, ProjectorConfig};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::janitor::Janitor;

/// Run projector and janitor loops until a shutdown signal arrives.
pub async fn run_daemon(config: Config, paths: Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;
    let db = open_database(&config, &paths).await?;

    let tenants = config.effective_tenants();
    info!(
        database = db.path(),
        bus = %config.bus_url,
        tenants = ?tenants,
        "outpostd starting"
    );

    let registry = Arc::new(build_registry(&config));
    let bus = build_bus(&config)?;
    let projector_config = projector_config(&config);

    let mut projectors = Vec::new();
    let mut tasks = Vec::new();
    for tenant in tenants {
        let projector = Arc::new(OutboxProjector::new(
            tenant,
            db.clone(),
            Arc::clone(&registry),
            Arc::clone(&bus),
            projector_config.clone(),
        ));
        let runner = Arc::clone(&projector);
        tasks.push(tokio::spawn(async move { runner.run_forever().await }));
        projectors.push(projector);
    }

    let janitor = Arc::new(Janitor::new(db.clone(), &config));
    let sweeper = Arc::clone(&janitor);
    tasks.push(tokio::spawn(async move { sweeper.run_forever().await }));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping workers");

    for projector in &projectors {
        projector.stop();
    }
    janitor.stop();

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "worker task panicked");
        }
    }

    info!("outpostd stopped");
    Ok(())
}

/// Reset one err/dead outbox row to new so the projector re-publishes it.
pub async fn replay_row(config: Config, paths: Paths, id: Uuid) -> anyhow::Result<()> {
    let db = open_database(&config, &paths).await?;

    let reset = db
        .call(move |conn| queries::replay_outbox_record(conn, id))
        .await?;
    if reset {
        println!("Outbox row {id} reset to new; a running projector will re-publish it.");
        return Ok(());
    }

    let row = db
        .call(move |conn| queries::get_outbox_record(conn, id))
        .await?;
    match row {
        Some(record) => anyhow::bail!(
            "outbox row {id} is '{}'; only err or dead rows can be replayed",
            record.status.as_str()
        ),
        None => anyhow::bail!("no outbox row with id {id}"),
    }
}

/// Print per-status backlog counts for one tenant.
pub async fn print_stats(
    config: Config,
    paths: Paths,
    tenant: Option<String>,
) -> anyhow::Result<()> {
    let db = open_database(&config, &paths).await?;
    let tenant = tenant.unwrap_or_else(|| config.default_tenant_id.clone());

    let stats = {
        let tenant = tenant.clone();
        db.call(move |conn| queries::outbox_backlog_stats(conn, &tenant))
            .await?
    };

    println!("Outbox backlog for tenant '{tenant}':");
    println!("  new:  {}", stats.new);
    println!("  sent: {}", stats.sent);
    println!("  err:  {}", stats.err);
    println!("  dead: {}", stats.dead);
    if let Some(oldest) = stats.oldest_new_at {
        println!("  oldest undelivered: {}", oldest.to_rfc3339());
    }

    Ok(())
}

async fn open_database(config: &Config, paths: &Paths) -> anyhow::Result<AsyncDatabase> {
    let path = config
        .database_path
        .clone()
        .unwrap_or_else(|| paths.database_file());
    Ok(AsyncDatabase::open(&path).await?)
}

/// Build the codec registry from the configured event types.
///
/// Named types are registered individually, so anything else is rejected as
/// poison. An empty list installs a schemaless fallback that forwards any
/// well-formed JSON payload.
fn build_registry(config: &Config) -> CodecRegistry {
    let mut registry = CodecRegistry::new();
    if config.event_types.is_empty() {
        warn!("no event types configured; payloads pass through without type checks");
        registry.set_fallback(Box::new(PassthroughCodec));
    } else {
        for event_type in &config.event_types {
            registry.register(event_type.clone(), Box::new(PassthroughCodec));
        }
        info!(event_types = registry.len(), "codec registry built");
    }
    registry
}

fn build_bus(config: &Config) -> anyhow::Result<Arc<dyn MessageBus>> {
    let bus = HttpBus::new(HttpBusConfig {
        endpoint: config.bus_url.clone(),
        auth_token: config.bus_token.clone(),
        ..HttpBusConfig::default()
    })?;
    Ok(Arc::new(bus))
}

fn projector_config(config: &Config) -> ProjectorConfig {
    ProjectorConfig {
        batch_size: config.batch_size,
        max_retry_attempts: config.max_retry_attempts,
        sleep_busy: Duration::from_millis(config.sleep_busy_ms),
        sleep_idle: Duration::from_millis(config.sleep_idle_ms),
        sleep_idle_max: Duration::from_millis(config.sleep_idle_max_ms),
        claim_ttl: Duration::from_secs(config.claim_ttl_secs),
        cooldown: Duration::from_millis(config.cooldown_ms),
    }
}
