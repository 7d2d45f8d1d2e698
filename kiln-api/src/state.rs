use kiln_catalog::ProductRepository;
use kiln_order::OrderLifecycleManager;
use std::sync::Arc;

use crate::middleware::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    /// Lifetime of issued tokens, in seconds
    pub expiration: u64,
}

pub struct ResiliencyState {
    pub gateway_cb: CircuitBreaker,
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderLifecycleManager>,
    pub products: Arc<dyn ProductRepository>,
    pub auth: AuthConfig,
    pub resiliency: Arc<ResiliencyState>,
}
