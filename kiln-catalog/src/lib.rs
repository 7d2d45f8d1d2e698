pub mod product;
pub mod pricing;
pub mod repository;

pub use product::{Category, CatalogError, NewProduct, Product, ProductUpdate};
pub use pricing::{
    CartLine, CheckoutPricing, ClientTotals, PricedLine, Quote, ShippingPolicy, MAX_CART_LINES,
    MAX_LINE_QUANTITY,
};
pub use repository::{InMemoryProductRepository, ProductRepository};
