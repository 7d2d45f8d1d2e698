pub mod auth;
pub mod resiliency;

pub use auth::{admin_auth_middleware, Claims, ADMIN_ROLE};
pub use resiliency::{gateway_circuit_middleware, CircuitBreaker, GatewayOutage};
