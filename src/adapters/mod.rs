pub mod postgres_purchase_repository;
pub mod postgres_storefront_repository;
pub mod postgres_transaction_repository;

pub use postgres_purchase_repository::PostgresPurchaseRepository;
pub use postgres_storefront_repository::PostgresStorefrontRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
