pub mod app_config;
pub mod catalog_repo;
pub mod database;
pub mod order_repo;
pub mod razorpay;

pub use app_config::Config;
pub use catalog_repo::PgProductRepository;
pub use database::DbClient;
pub use order_repo::PgOrderRepository;
pub use razorpay::RazorpayGateway;
