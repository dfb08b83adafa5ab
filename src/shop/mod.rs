pub mod definition;
pub mod purchase;
pub mod registry;

pub use definition::{format_money, CatalogEntry, Currency, ShopDefinition, ShopStockItem};
pub use purchase::{purchase, Purchase, PurchaseError};
pub use registry::ShopRegistry;
