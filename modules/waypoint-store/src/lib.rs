pub mod document;
pub mod memory;
pub mod postgres;
pub mod repo;

pub use document::{collections, Document, DocumentStore};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use repo::JourneyRepo;
