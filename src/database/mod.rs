pub mod listing;
pub mod manager;
pub mod models;
pub mod repository;

pub use listing::{IndexQuery, ListParams, Listing, Page, PageMeta};
pub use manager::{DatabaseError, DatabaseManager};
pub use repository::Repository;
