//! Atomically swappable route table.
//!
//! # Responsibilities
//! - Hand out consistent snapshots to request handlers
//! - Validate and publish replacement tables on reload
//!
//! # Design Decisions
//! - Copy-and-swap via `ArcSwap`: readers never take a lock and never see a mix
//! - A table is published together with the handler built for the same
//!   config, so a request never pairs a new table with an old handler
//! - A request keeps the snapshot it started with until its response is written
//! - Reloads are serialized so generations are published in order
//! - A rejected reload leaves the active snapshot untouched

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::config::RouteConfig;
use crate::error::ConfigurationError;
use crate::observability::metrics;
use crate::routing::table::RouteTable;

/// One published generation: the route table and the handler that serves it.
#[derive(Debug)]
pub struct Snapshot<H> {
    table: Arc<RouteTable>,
    handler: Arc<H>,
}

impl<H> Snapshot<H> {
    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }
}

/// Shared holder for the active snapshot.
#[derive(Debug)]
pub struct RouteStore<H = ()> {
    current: ArcSwap<Snapshot<H>>,
    next_generation: AtomicU64,
    reload_lock: Mutex<()>,
}

impl<H> RouteStore<H> {
    /// Wrap an already-built table.
    pub fn new(table: RouteTable, handler: H) -> Self {
        let next = table.generation() + 1;
        metrics::record_route_table(table.generation(), table.len());
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                table: Arc::new(table),
                handler: Arc::new(handler),
            }),
            next_generation: AtomicU64::new(next),
            reload_lock: Mutex::new(()),
        }
    }

    /// Build the initial table (generation 1) from configuration.
    pub fn from_configs(routes: &[RouteConfig], handler: H) -> Result<Self, Vec<ConfigurationError>> {
        Ok(Self::new(RouteTable::build(routes, 1)?, handler))
    }

    /// The table and handler in effect right now.
    pub fn snapshot(&self) -> Arc<Snapshot<H>> {
        self.current.load_full()
    }

    /// The table in effect right now.
    pub fn table(&self) -> Arc<RouteTable> {
        self.current.load().table.clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().table.generation()
    }

    /// Validate `routes` and publish them, with `handler`, as the new snapshot.
    ///
    /// Returns the new generation, or every validation error with the old
    /// snapshot still active.
    pub fn reload(&self, routes: &[RouteConfig], handler: H) -> Result<u64, Vec<ConfigurationError>> {
        let _guard = self
            .reload_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let generation = self.next_generation.load(Ordering::SeqCst);
        let table = match RouteTable::build(routes, generation) {
            Ok(table) => table,
            Err(errors) => {
                tracing::error!(
                    error_count = errors.len(),
                    active_generation = self.generation(),
                    "Route reload rejected, keeping current table"
                );
                for error in &errors {
                    tracing::error!(%error, "Route configuration error");
                }
                metrics::record_route_reload(false);
                return Err(errors);
            }
        };

        let route_count = table.len();
        self.current.store(Arc::new(Snapshot {
            table: Arc::new(table),
            handler: Arc::new(handler),
        }));
        self.next_generation.store(generation + 1, Ordering::SeqCst);

        tracing::info!(generation, routes = route_count, "Route table published");
        metrics::record_route_reload(true);
        metrics::record_route_table(generation, route_count);
        Ok(generation)
    }
}
