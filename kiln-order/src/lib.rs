pub mod models;
pub mod changes;
pub mod repository;
pub mod orchestrator;
pub mod manager;

pub use models::{
    CustomerDetails, LineItem, Order, OrderNumber, OrderStatus, PaymentDetails, PaymentMethod,
    PaymentStatus, RefundDetails, RefundStatus,
};
pub use changes::{Actor, ChangeType, OrderChange};
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use orchestrator::{MockPaymentGateway, PaymentOrchestrator};
pub use manager::{
    CheckoutRequest, CreatedOrder, LifecycleConfig, OrderError, OrderLifecycleManager,
    PaymentConfirmation, RefundOutcome, RefundRequest,
};
