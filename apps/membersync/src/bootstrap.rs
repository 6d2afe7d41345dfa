//! Service assembly.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use membersync_core::{
    CacheRefresher, DirectoryCache, DirectoryClient, EngineConfig, PrefixGroupMapping,
    ReconciliationEngine, SchedulerConfig, SyncScheduler, UserSource,
};
use membersync_graph::{GraphDirectory, GraphError};
use membersync_qlik::{QlikClient, QlikError};

use crate::config::AppConfig;

/// Errors that stop the service from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Graph client setup failed: {0}")]
    Graph(#[from] GraphError),

    #[error("Qlik client setup failed: {0}")]
    Qlik(#[from] QlikError),
}

/// Builds the Graph and Qlik clients and wires them into a scheduler.
///
/// # Errors
///
/// Returns `StartupError` if either client cannot be constructed.
#[instrument(skip(config), fields(groups = config.target_groups.len()))]
pub fn build_scheduler(config: AppConfig) -> Result<Arc<SyncScheduler>, StartupError> {
    let engine_config = config.engine_config();
    let scheduler_config = config.scheduler_config();

    let directory = GraphDirectory::connect(&config.graph, config.graph_credentials)?;
    let source = QlikClient::new(config.qlik)?;

    info!(
        tenant_id = %config.graph.tenant_id,
        remove_memberships = engine_config.remove_memberships,
        "Clients ready"
    );
    Ok(assemble(
        Arc::new(source),
        Arc::new(directory),
        engine_config,
        scheduler_config,
    ))
}

/// Wires a source and a directory into a scheduler sharing one cache.
pub fn assemble(
    source: Arc<dyn UserSource>,
    directory: Arc<dyn DirectoryClient>,
    engine_config: EngineConfig,
    scheduler_config: SchedulerConfig,
) -> Arc<SyncScheduler> {
    let cache = Arc::new(DirectoryCache::new());
    let mapping = Arc::new(PrefixGroupMapping::from_target_groups(
        &engine_config.target_groups,
    ));
    let refresher = CacheRefresher::new(
        Arc::clone(&directory),
        Arc::clone(&cache),
        &engine_config.target_groups,
    );
    let engine = ReconciliationEngine::new(source, directory, cache, mapping, engine_config);

    Arc::new(SyncScheduler::new(refresher, engine, scheduler_config))
}
