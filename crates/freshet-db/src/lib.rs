pub mod backend;
pub mod catalog_repository;
pub mod config;
pub mod database;
pub mod job_repository;

pub use backend::QueueBackend;
pub use catalog_repository::CatalogRepository;
pub use config::DatabaseConfig;
pub use database::Database;
pub use job_repository::PgJobQueue;
