pub mod payment;
pub mod repository;

pub use payment::{
    GatewayError, GatewayOrder, GatewayRefund, PaymentGateway, RefundInstruction, RefundSpeed,
    SignatureVerifier,
};
pub use repository::{RepoResult, RepositoryError};
