//! Concrete adapters consumed by the resolver/planner/installer/doctor
//! crates: filesystem, structured-document merge/templating, schema
//! validation, hashing, and receipt persistence.

pub mod fs;
pub mod hashing;
pub mod receipts;
pub mod schema;
pub mod yaml_ops;

pub use receipts::ReceiptStore;
