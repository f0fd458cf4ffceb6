pub mod catalog;
pub mod inventory;
pub mod pricing;

pub use catalog::{InMemoryCatalogRepository, InventoryCatalog};
pub use inventory::InMemoryLedger;
pub use pricing::{PricingEngine, Quote};
