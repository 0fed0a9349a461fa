//! TTL Reaper Binary
//!
//! Runs the TTL monitor against an in-memory engine seeded with demo
//! collections until interrupted.

use chrono::{TimeDelta, Utc};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ttl_reaper::storage::{CollectionOptions, ObjectId, ID_FIELD};
use ttl_reaper::{
    shutdown_ttl_monitor, start_ttl_monitor, BoundKind, Document, MemoryEngine, MonitorConfig,
    MonitorDeps, ServiceContext, TtlCollectionCache, TtlMonitor, TtlSpec,
};

/// TTL Reaper - background document expiration
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Seconds between the start of consecutive passes
    #[arg(long, default_value_t = 60)]
    pass_interval: u64,

    /// Keep the monitor thread running but skip every pass
    #[arg(long, default_value_t = false)]
    disabled: bool,

    /// Milliseconds a deletion waits for a collection lock
    #[arg(long, default_value_t = 1000)]
    lock_timeout_ms: u64,

    /// Documents seeded into each demo collection
    #[arg(long, default_value_t = 1000)]
    demo_docs: u32,

    /// expireAfterSeconds of the demo TTL rules
    #[arg(long, default_value_t = 3600)]
    expire_after: u64,
}

// Demo ages are capped so every seeded date stays representable
const MAX_DEMO_SPAN_SECS: u64 = 10 * 365 * 24 * 3600;

/// Age of the `i`th of `docs` demo documents. Ages spread over twice the
/// expiry window so about half the documents start out expired. The extra
/// `i` milliseconds keep every age distinct, which clustered keys require.
fn demo_age(i: u32, docs: u32, expire_after: u64) -> TimeDelta {
    let span_ms = expire_after
        .saturating_mul(2)
        .clamp(1, MAX_DEMO_SPAN_SECS)
        .saturating_mul(1000);
    let spread = u128::from(i) * u128::from(span_ms) / u128::from(docs.max(1));
    TimeDelta::milliseconds(i64::try_from(spread).unwrap_or(0) + i64::from(i))
}

fn seed(engine: &MemoryEngine, cache: &TtlCollectionCache, args: &Args) -> anyhow::Result<()> {
    let now = Utc::now();
    let age = |i: u32| demo_age(i, args.demo_docs, args.expire_after);

    let sessions = engine.create_collection("app.sessions", CollectionOptions::default())?;
    engine.create_index(sessions, "lastSeen_1", "lastSeen")?;
    cache.register(TtlSpec::index(sessions, "app.sessions", "lastSeen_1", args.expire_after));

    let events = engine.create_collection("app.events", CollectionOptions::clustered())?;
    cache.register(TtlSpec::clustered(events, "app.events", BoundKind::Date, args.expire_after));

    let buckets = engine.create_collection(
        "metrics.system.buckets.cpu",
        CollectionOptions::time_series(),
    )?;
    cache.register(TtlSpec::clustered(
        buckets,
        "metrics.system.buckets.cpu",
        BoundKind::ObjectIdTimestamp,
        args.expire_after,
    ));

    for i in 0..args.demo_docs {
        let at = now - age(i);
        engine.insert(sessions, Document::new().with("lastSeen", at).with("user", i64::from(i)))?;
        engine.insert(events, Document::new().with(ID_FIELD, at))?;
        let oid = ObjectId::new(u32::try_from(at.timestamp()).unwrap_or(0), u64::from(i));
        engine.insert(buckets, Document::new().with(ID_FIELD, oid))?;
    }

    info!(
        collections = 3,
        docs_per_collection = args.demo_docs,
        expire_after = args.expire_after,
        "Seeded demo collections"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ttl_reaper=info".parse()?))
        .init();

    let args = Args::parse();

    let engine = Arc::new(
        MemoryEngine::new().with_lock_timeout(Duration::from_millis(args.lock_timeout_ms)),
    );
    let cache = Arc::new(TtlCollectionCache::new());
    seed(&engine, &cache, &args)?;

    let config = MonitorConfig::default()
        .with_pass_interval(Duration::from_secs(args.pass_interval))
        .with_enabled(!args.disabled);

    let ctx = Arc::new(ServiceContext::new());
    start_ttl_monitor(&ctx, config, MonitorDeps::new(cache, engine))?;
    info!(
        pass_interval = args.pass_interval,
        enabled = !args.disabled,
        "TTL reaper running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;

    // Shutdown joins the monitor thread
    let shutdown_ctx = Arc::clone(&ctx);
    tokio::task::spawn_blocking(move || shutdown_ttl_monitor(&shutdown_ctx)).await?;

    if let Some(monitor) = TtlMonitor::get(&ctx) {
        info!("{}", monitor.metrics().summary());
        print!("{}", monitor.metrics().export());
    }

    Ok(())
}
