pub mod product;
pub mod purchase;
pub mod transaction;

pub use product::Product;
pub use purchase::{NewPurchase, Purchase, PURCHASE_COMPLETED};
pub use transaction::{LineItem, Transaction, TransactionStatus};
