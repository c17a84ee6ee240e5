// handlers/protected/uploads - /api/v1/uploads
pub mod crud;
pub mod transfer;
pub mod trash;

pub use crud::{destroy, index, show, store, update};
pub use transfer::{export, import};
pub use trash::{bulk_delete, bulk_restore, force_delete, restore};
