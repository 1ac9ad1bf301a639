use freshet_core::ScrapeCoordinator;
use freshet_db::{CatalogRepository, Database, QueueBackend};

pub type Coordinator = ScrapeCoordinator<QueueBackend, CatalogRepository>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub coordinator: Coordinator,
}
