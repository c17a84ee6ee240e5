// handlers/protected/users - /api/v1/users
pub mod block_ip;
pub mod crud;
pub mod transfer;
pub mod trash;

pub use block_ip::{block_ip, unblock_ip};
pub use crud::{destroy, index, show, store, update};
pub use transfer::{export, import};
pub use trash::{bulk_delete, bulk_restore, force_delete, restore};
