//! Cart aggregate.
//!
//! A cart maps product ids to lines. Every line has a quantity of at least
//! one; a line whose quantity would drop to zero is removed instead. Totals
//! are computed on every read.

use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::types::{Price, ProductId};

/// One product in a cart, with the product details copied at add time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(rename = "id")]
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub unit: String,
    pub icon: String,
    pub quantity: u32,
}

impl CartLine {
    fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            unit: product.unit.clone(),
            icon: product.icon.clone(),
            quantity,
        }
    }

    /// `price * quantity`.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// A member's cart, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Add `delta` units of `product`.
    ///
    /// An existing line keeps its original price snapshot and only has its
    /// quantity increased. Returns `false` if nothing changed (`delta == 0`).
    pub fn add_item(&mut self, product: &Product, delta: u32) -> bool {
        if delta == 0 {
            return false;
        }
        if let Some(line) = self.line_mut(&product.id) {
            line.quantity = line.quantity.saturating_add(delta);
        } else {
            self.lines.push(CartLine::from_product(product, delta));
        }
        true
    }

    /// Change the quantity of an existing line by `delta`.
    ///
    /// Unknown products are ignored. A resulting quantity of zero or less
    /// removes the line. Returns `false` if nothing changed.
    pub fn adjust_quantity(&mut self, product_id: &ProductId, delta: i64) -> bool {
        let Some(index) = self.lines.iter().position(|l| &l.product_id == product_id) else {
            return false;
        };
        if delta == 0 {
            return false;
        }
        let next = i64::from(self.lines.get(index).map_or(0, |l| l.quantity)).saturating_add(delta);
        if next <= 0 {
            self.lines.remove(index);
        } else if let Some(line) = self.lines.get_mut(index) {
            line.quantity = u32::try_from(next).unwrap_or(u32::MAX);
        }
        true
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Sum of `price * quantity` over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: &ProductId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| &l.product_id == product_id)
    }

    /// The persisted form of this cart.
    #[must_use]
    pub fn to_document(&self) -> CartDocument {
        CartDocument {
            items: self.lines.clone(),
        }
    }
}

impl From<CartDocument> for Cart {
    fn from(doc: CartDocument) -> Self {
        Self { lines: doc.items }
    }
}

impl Serialize for Cart {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Cart {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        CartDocument::deserialize(deserializer).map(Self::from)
    }
}

// ===== Stored form =====

/// Cart as stored in `users/{member}/cart/current`.
///
/// Decoding is lenient about what other writers may have stored: duplicate
/// product ids are merged into one line and lines with a quantity of zero or
/// less are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCartDocument")]
pub struct CartDocument {
    pub items: Vec<CartLine>,
}

#[derive(Deserialize)]
struct RawCartDocument {
    #[serde(default)]
    items: Vec<RawCartLine>,
}

#[derive(Deserialize)]
struct RawCartLine {
    id: ProductId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    price: Price,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    quantity: i64,
}

impl From<RawCartDocument> for CartDocument {
    fn from(raw: RawCartDocument) -> Self {
        let mut items: Vec<CartLine> = Vec::with_capacity(raw.items.len());
        for line in raw.items {
            let Ok(quantity) = u32::try_from(line.quantity) else {
                continue;
            };
            if quantity == 0 {
                continue;
            }
            if let Some(existing) = items.iter_mut().find(|l| l.product_id == line.id) {
                existing.quantity = existing.quantity.saturating_add(quantity);
                continue;
            }
            items.push(CartLine {
                product_id: line.id,
                name: line.name,
                price: line.price,
                unit: line.unit,
                icon: line.icon,
                quantity,
            });
        }
        Self { items }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn product(id: &str, price: u32) -> Product {
        Product::new(id, id, Price::from_whole(price), "包", "葉菜類", "🥬")
    }

    fn assert_invariants(cart: &Cart) {
        let expected: Price = cart
            .lines()
            .iter()
            .map(|l| l.price.times(l.quantity))
            .sum();
        assert_eq!(cart.total(), expected);
        assert!(cart.lines().iter().all(|l| l.quantity >= 1));
    }

    #[test]
    fn test_add_twice_remove_one() {
        let p = product("p", 45);
        let mut cart = Cart::new();
        cart.add_item(&p, 1);
        cart.add_item(&p, 1);
        cart.adjust_quantity(&p.id, -1);

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.get(&p.id).unwrap().quantity, 1);
        assert_eq!(cart.total(), Price::from_whole(45));
    }

    #[test]
    fn test_line_count_vs_item_count() {
        let mut cart = Cart::new();
        cart.add_item(&product("a", 50), 2);
        cart.add_item(&product("b", 30), 1);
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), Price::from_whole(130));
    }

    #[test]
    fn test_adjust_to_zero_or_below_removes_line() {
        let p = product("p", 10);
        let mut cart = Cart::new();
        cart.add_item(&p, 2);
        assert!(cart.adjust_quantity(&p.id, -5));
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Price::ZERO);
    }

    #[test]
    fn test_adjust_unknown_is_noop() {
        let mut cart = Cart::new();
        assert!(!cart.adjust_quantity(&ProductId::new("ghost"), 3));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_price_snapshot_kept_on_readd() {
        let mut p = product("p", 10);
        let mut cart = Cart::new();
        cart.add_item(&p, 1);
        p.price = Price::from_whole(99);
        cart.add_item(&p, 1);
        assert_eq!(cart.total(), Price::from_whole(20));
    }

    #[test]
    fn test_invariants_hold_over_mixed_sequence() {
        let catalog = Catalog::seed();
        let products = catalog.all();
        let mut cart = Cart::new();
        let deltas: [i64; 12] = [3, -1, 2, -4, 1, 0, 5, -5, 2, -1, -1, 7];
        for (step, delta) in deltas.iter().enumerate() {
            let product = &products[step % products.len()];
            if *delta > 0 {
                cart.add_item(product, u32::try_from(*delta).unwrap());
            }
            cart.adjust_quantity(&product.id, *delta);
            assert_invariants(&cart);
        }
    }

    #[test]
    fn test_document_decode_collapses_and_drops() {
        let json = r#"{"items":[
            {"id":"a","name":"A","price":50,"unit":"包","icon":"🥬","quantity":1},
            {"id":"a","name":"A","price":50,"unit":"包","icon":"🥬","quantity":2},
            {"id":"b","name":"B","price":30,"unit":"包","icon":"🥬","quantity":0},
            {"id":"c","name":"C","price":30,"unit":"包","icon":"🥬","quantity":-2}
        ]}"#;
        let cart: Cart = serde_json::from_str(json).unwrap();
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.get(&ProductId::new("a")).unwrap().quantity, 3);
        assert_invariants(&cart);
    }

    #[test]
    fn test_missing_items_decodes_empty() {
        let cart: Cart = serde_json::from_str("{}").unwrap();
        assert!(cart.is_empty());
        let value = serde_json::to_value(&cart).unwrap();
        assert_eq!(value, serde_json::json!({"items": []}));
    }

    #[test]
    fn test_total_of_huge_decoded_prices_saturates() {
        let json = r#"{"items":[
            {"id":"a","name":"A","price":"79228162514264337593543950335","unit":"包","icon":"🥬","quantity":2},
            {"id":"b","name":"B","price":"79228162514264337593543950335","unit":"包","icon":"🥬","quantity":1}
        ]}"#;
        let cart: Cart = serde_json::from_str(json).unwrap();
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.total().amount(), rust_decimal::Decimal::MAX);
    }
}
