use kiln_shared::Money;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::product::{CatalogError, Product};
use crate::repository::ProductRepository;

pub const MAX_CART_LINES: usize = 100;
pub const MAX_LINE_QUANTITY: u32 = 1_000;

/// Shipping charged on a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    /// Carts at or above this subtotal ship free
    pub free_shipping_threshold: Money,
    pub flat_rate: Money,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_major(50.0),
            flat_rate: Money::from_major(50.0),
        }
    }
}

impl ShippingPolicy {
    pub fn shipping_for(&self, subtotal: Money) -> Money {
        if subtotal >= self.free_shipping_threshold {
            Money::ZERO
        } else {
            self.flat_rate
        }
    }
}

/// A cart line as submitted at checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// A cart line resolved against the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub product_id: Uuid,
    pub title: String,
    pub price: Money,
    pub quantity: u32,
    pub image: String,
}

impl PricedLine {
    /// `None` if the line total does not fit in `Money`
    pub fn line_total(&self) -> Option<Money> {
        self.price.checked_mul(self.quantity)
    }
}

/// Totals the storefront displayed to the customer. Any of them may be omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTotals {
    pub subtotal: Option<Money>,
    pub shipping: Option<Money>,
    pub total: Option<Money>,
}

/// Server-side price of a cart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
}

impl Quote {
    /// Reject client totals that disagree with the server's price
    pub fn reconcile(&self, client: &ClientTotals) -> Result<(), CatalogError> {
        let checks = [
            ("subtotal", client.subtotal, self.subtotal),
            ("shipping", client.shipping, self.shipping),
            ("total", client.total, self.total),
        ];

        for (field, claimed, computed) in checks {
            if let Some(claimed) = claimed {
                if claimed != computed {
                    return Err(CatalogError::Validation(format!(
                        "{} mismatch: submitted {}, expected {}",
                        field, claimed, computed
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Prices carts from authoritative catalog records
#[derive(Debug, Clone, Default)]
pub struct CheckoutPricing {
    shipping: ShippingPolicy,
}

impl CheckoutPricing {
    pub fn new(shipping: ShippingPolicy) -> Self {
        Self { shipping }
    }

    pub fn quote(
        &self,
        lines: &[CartLine],
        products: &HashMap<Uuid, Product>,
    ) -> Result<Quote, CatalogError> {
        check_cart_size(lines)?;

        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                return Err(CatalogError::Validation(format!(
                    "quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(CatalogError::Validation(format!(
                    "quantity for product {} cannot exceed {}",
                    line.product_id, MAX_LINE_QUANTITY
                )));
            }
            let product = products
                .get(&line.product_id)
                .ok_or_else(|| CatalogError::NotFound(line.product_id.to_string()))?;

            priced.push(PricedLine {
                product_id: product.id,
                title: product.title.clone(),
                price: product.price,
                quantity: line.quantity,
                image: product.primary_image().to_string(),
            });
        }

        let subtotal = priced
            .iter()
            .try_fold(Money::ZERO, |acc, line| line.line_total()?.checked_add(acc))
            .ok_or_else(overflow)?;
        let shipping = self.shipping.shipping_for(subtotal);
        let total = subtotal.checked_add(shipping).ok_or_else(overflow)?;

        Ok(Quote {
            lines: priced,
            subtotal,
            shipping,
            total,
        })
    }

    /// Fetch every product on the cart, then quote it
    pub async fn quote_from_catalog(
        &self,
        lines: &[CartLine],
        catalog: &dyn ProductRepository,
    ) -> Result<Quote, CatalogError> {
        check_cart_size(lines)?;

        let mut products = HashMap::new();
        for line in lines {
            if products.contains_key(&line.product_id) {
                continue;
            }
            if let Some(product) = catalog.get_product(line.product_id).await? {
                products.insert(product.id, product);
            }
        }
        self.quote(lines, &products)
    }
}

fn check_cart_size(lines: &[CartLine]) -> Result<(), CatalogError> {
    if lines.is_empty() {
        return Err(CatalogError::Validation("cart is empty".to_string()));
    }
    if lines.len() > MAX_CART_LINES {
        return Err(CatalogError::Validation(format!(
            "cart cannot hold more than {} lines",
            MAX_CART_LINES
        )));
    }
    Ok(())
}

fn overflow() -> CatalogError {
    CatalogError::Validation("cart total is too large".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Category, NewProduct};
    use crate::repository::InMemoryProductRepository;

    fn product(title: &str, price: f64) -> Product {
        NewProduct {
            title: title.to_string(),
            images: vec![format!("{}.jpg", title.to_lowercase())],
            description: "Hand-glazed terracotta piece".to_string(),
            price: Money::from_major(price),
            category: Category::Pots,
            rating: None,
        }
        .into_product()
        .unwrap()
    }

    #[test]
    fn test_quote_uses_catalog_prices() {
        let pot = product("Planter", 300.0);
        let vase = product("Bud Vase", 350.0);
        let products: HashMap<Uuid, Product> =
            [(pot.id, pot.clone()), (vase.id, vase.clone())].into_iter().collect();

        let quote = CheckoutPricing::default()
            .quote(
                &[
                    CartLine { product_id: pot.id, quantity: 2 },
                    CartLine { product_id: vase.id, quantity: 1 },
                ],
                &products,
            )
            .unwrap();

        assert_eq!(quote.subtotal, Money::from_major(950.0));
        assert_eq!(quote.shipping, Money::ZERO);
        assert_eq!(quote.total, Money::from_major(950.0));
        assert_eq!(quote.lines[0].image, "planter.jpg");
    }

    #[test]
    fn test_small_cart_pays_flat_shipping() {
        let coaster = product("Coaster", 40.0);
        let products: HashMap<Uuid, Product> = [(coaster.id, coaster.clone())].into_iter().collect();

        let quote = CheckoutPricing::default()
            .quote(&[CartLine { product_id: coaster.id, quantity: 1 }], &products)
            .unwrap();

        assert_eq!(quote.shipping, Money::from_major(50.0));
        assert_eq!(quote.total, Money::from_major(90.0));
    }

    #[test]
    fn test_reconcile_rejects_under_reported_total() {
        let jug = product("Water Jug", 500.0);
        let products: HashMap<Uuid, Product> = [(jug.id, jug.clone())].into_iter().collect();
        let quote = CheckoutPricing::default()
            .quote(&[CartLine { product_id: jug.id, quantity: 1 }], &products)
            .unwrap();

        let honest = ClientTotals {
            subtotal: Some(Money::from_major(500.0)),
            shipping: Some(Money::ZERO),
            total: Some(Money::from_major(500.0)),
        };
        assert!(quote.reconcile(&honest).is_ok());
        assert!(quote.reconcile(&ClientTotals::default()).is_ok());

        let cheat = ClientTotals {
            total: Some(Money::from_major(1.0)),
            ..Default::default()
        };
        assert!(matches!(quote.reconcile(&cheat), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn test_empty_cart_and_zero_quantity_rejected() {
        let pricing = CheckoutPricing::default();
        assert!(pricing.quote(&[], &HashMap::new()).is_err());

        let plate = product("Dinner Plate", 200.0);
        let products: HashMap<Uuid, Product> = [(plate.id, plate.clone())].into_iter().collect();
        let result = pricing.quote(&[CartLine { product_id: plate.id, quantity: 0 }], &products);
        assert!(matches!(result, Err(CatalogError::Validation(_))));
    }

    #[tokio::test]
    async fn test_quote_from_catalog_reports_unknown_product() {
        let catalog = InMemoryProductRepository::new();
        let mug = product("Tea Mug", 150.0);
        catalog.create_product(&mug).await.unwrap();

        let lines = [
            CartLine { product_id: mug.id, quantity: 1 },
            CartLine { product_id: Uuid::new_v4(), quantity: 1 },
        ];
        let result = CheckoutPricing::default().quote_from_catalog(&lines, &catalog).await;
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_oversized_quantities_are_rejected() {
        let urn = product("Terracotta Urn", 1000.0);
        let products: HashMap<Uuid, Product> = [(urn.id, urn.clone())].into_iter().collect();
        let pricing = CheckoutPricing::default();

        let result = pricing.quote(&[CartLine { product_id: urn.id, quantity: u32::MAX }], &products);
        assert!(matches!(result, Err(CatalogError::Validation(_))));

        let at_cap = pricing
            .quote(&[CartLine { product_id: urn.id, quantity: MAX_LINE_QUANTITY }], &products)
            .unwrap();
        assert_eq!(at_cap.total, Money::from_major(1_000_000.0));

        let too_many_lines = vec![CartLine { product_id: urn.id, quantity: 1 }; MAX_CART_LINES + 1];
        assert!(matches!(pricing.quote(&too_many_lines, &products), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn test_overflowing_total_is_rejected() {
        let mut vault = product("Gold Vase", 1.0);
        vault.price = Money::from_minor(i64::MAX / 2);
        let products: HashMap<Uuid, Product> = [(vault.id, vault.clone())].into_iter().collect();

        let result = CheckoutPricing::default().quote(
            &[
                CartLine { product_id: vault.id, quantity: 1 },
                CartLine { product_id: vault.id, quantity: 2 },
            ],
            &products,
        );
        assert!(matches!(result, Err(CatalogError::Validation(msg)) if msg.contains("too large")));
    }
}
