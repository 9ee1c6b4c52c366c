use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use hive_ec2::backend::MemoryBlockBackend;
use hive_ec2::bus::MemoryBus;
use hive_ec2::config::DaemonConfig;
use hive_ec2::error::Ec2Error;
use hive_ec2::logging;
use hive_ec2::services::image::{InstanceFacts, InstanceResolver};
use hive_ec2::services::keypair::HostKeyGenerator;
use hive_ec2::services::ServiceRouter;
use hive_ec2::store::blob::MemoryBlobStore;
use hive_ec2::store::kv::MemoryKvStore;

/// Placeholder resolver for the embedded fabric: no instance-lifecycle
/// daemon is attached, so every instance lookup misses.
struct EmbeddedResolver;

#[async_trait]
impl InstanceResolver for EmbeddedResolver {
    async fn resolve(&self, _instance_id: &str) -> Result<Option<InstanceFacts>, Ec2Error> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = DaemonConfig::get()
        .map_err(|e| anyhow::anyhow!("failed to load daemon configuration: {e:?}"))?;
    logging::print_startup_banner("Hive EC2 Daemon", &config.availability_zone, &config.account_id);

    // The embedded fabric keeps the whole pipeline in one process. The
    // production deployment swaps these for the platform bus, the blob
    // store, the replicated KV store, and the block engine; the services
    // only see the seams.
    let bus = Arc::new(MemoryBus::new());
    let blob = Arc::new(MemoryBlobStore::new());
    let kv = Arc::new(MemoryKvStore::new());
    let backend = Arc::new(MemoryBlockBackend::new());

    let router = ServiceRouter::new(
        blob,
        Some(kv),
        bus.clone(),
        backend,
        Arc::new(EmbeddedResolver),
        Arc::new(HostKeyGenerator),
        config.clone(),
    )
    .await;
    router
        .subscribe_all(bus.as_ref())
        .await
        .map_err(|e| anyhow::anyhow!("failed to register services on the bus: {e}"))?;
    info!(
        "daemon serving {} ({} bucket)",
        config.availability_zone, config.bucket
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
