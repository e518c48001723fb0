//! # Cart
//!
//! Ordered buyer cart, persisted through a [`KeyValueStore`].
//!
//! Prices are integer cents; totals use checked arithmetic.

use crate::storage::{KeyValueStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store key under which the cart is persisted.
pub const CART_KEY: &str = "cart";

#[derive(Debug, Error)]
pub enum CartError {
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    #[error("unit price must be positive")]
    ZeroPrice,

    #[error("product {0} is not in the cart")]
    NotInCart(String),

    #[error("cart total overflows")]
    Overflow,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: u64,
}

impl CartLine {
    /// `quantity * unit_price_cents`, or `None` on overflow.
    #[must_use]
    pub fn subtotal_cents(&self) -> Option<u64> {
        self.unit_price_cents.checked_mul(u64::from(self.quantity))
    }
}

/// The cart: lines in insertion order, one line per product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the persisted cart, or an empty one.
    pub fn load(store: &impl KeyValueStore) -> Result<Self, CartError> {
        Ok(store.get_value::<Cart>(CART_KEY)?.unwrap_or_default())
    }

    /// Persist the cart; an empty cart removes the key.
    pub fn save(&self, store: &mut impl KeyValueStore) -> Result<(), CartError> {
        if self.lines.is_empty() {
            store.remove(CART_KEY)?;
        } else {
            store.set_value(CART_KEY, self)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Add units of a product.
    ///
    /// An existing line keeps its position; its quantity grows (saturating)
    /// and its unit price is refreshed.
    pub fn add(
        &mut self,
        product_id: impl Into<String>,
        quantity: u32,
        unit_price_cents: u64,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }
        if unit_price_cents == 0 {
            return Err(CartError::ZeroPrice);
        }
        let product_id = product_id.into();
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                line.quantity = line.quantity.saturating_add(quantity);
                line.unit_price_cents = unit_price_cents;
            }
            None => self.lines.push(CartLine {
                product_id,
                quantity,
                unit_price_cents,
            }),
        }
        Ok(())
    }

    /// Set the quantity of a line; 0 removes it.
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove(product_id).map(|_| ());
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CartError::NotInCart(product_id.to_string()))?;
        line.quantity = quantity;
        Ok(())
    }

    /// Remove a line, returning it.
    pub fn remove(&mut self, product_id: &str) -> Result<CartLine, CartError> {
        let index = self
            .lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or_else(|| CartError::NotInCart(product_id.to_string()))?;
        Ok(self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Total number of units.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Sum of all subtotals.
    pub fn total_cents(&self) -> Result<u64, CartError> {
        self.lines.iter().try_fold(0u64, |acc, line| {
            line.subtotal_cents()
                .and_then(|s| acc.checked_add(s))
                .ok_or(CartError::Overflow)
        })
    }
}
