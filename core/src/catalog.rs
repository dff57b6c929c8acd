//! Product catalog.
//!
//! A product row is also the stock ledger row: the catalog exposes the
//! counters read-only and mutates `total_available_stock` only through the
//! guarded [`CatalogRepository::restock`].

use crate::error::{DomainError, Result};
use crate::ids::ProductId;
use crate::stock::StockLevel;
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default page size for product listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Largest stock adjustment, in either direction, accepted in one call.
pub const MAX_STOCK_ADJUSTMENT: i64 = 1_000_000;

/// A catalog product with its ledger counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Category slug (e.g. "dairy")
    pub category: String,
    /// Price per unit in cents
    pub price_cents: i64,
    /// Sales unit (e.g. "kg", "piece")
    pub unit: String,
    /// Optional image location
    pub image_url: Option<String>,
    /// Inactive products are hidden from listings and cannot be carted
    pub is_active: bool,
    /// Units in the leading warehouse
    pub total_available_stock: i64,
    /// Units claimed by in-flight checkouts
    pub buying_in_progress: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Units a new checkout could reserve right now.
    #[must_use]
    pub const fn available_now(&self) -> i64 {
        self.total_available_stock - self.buying_in_progress
    }

    /// Ledger view of this product.
    #[must_use]
    pub fn stock_level(&self, last_reserved_at: Option<DateTime<Utc>>) -> StockLevel {
        StockLevel::new(
            self.id,
            self.name.clone(),
            self.total_available_stock,
            self.buying_in_progress,
            last_reserved_at,
        )
    }
}

/// Admin input for a new product.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Category slug
    pub category: String,
    /// Price per unit in cents
    pub price_cents: i64,
    /// Sales unit
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Optional image location
    #[serde(default)]
    pub image_url: Option<String>,
    /// Stock placed in the leading warehouse on creation
    #[serde(default)]
    pub initial_stock: i64,
}

fn default_unit() -> String {
    "piece".to_string()
}

impl NewProduct {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] for an empty name or category, or a
    /// negative price, or an initial stock outside `0..=MAX_STOCK_ADJUSTMENT`.
    pub fn validate(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        self.category = self.category.trim().to_lowercase();
        if self.name.is_empty() {
            return Err(DomainError::validation("Product name must not be empty"));
        }
        if self.category.is_empty() {
            return Err(DomainError::validation("Category must not be empty"));
        }
        if self.price_cents < 0 {
            return Err(DomainError::validation("Price must not be negative"));
        }
        if self.initial_stock < 0 {
            return Err(DomainError::validation("Initial stock must not be negative"));
        }
        if self.initial_stock > MAX_STOCK_ADJUSTMENT {
            return Err(DomainError::validation(format!(
                "Initial stock must not exceed {MAX_STOCK_ADJUSTMENT}"
            )));
        }
        Ok(self)
    }
}

/// Check a restock adjustment before it reaches storage.
///
/// # Errors
///
/// Returns [`DomainError::Validation`] for a zero delta or one whose
/// magnitude exceeds [`MAX_STOCK_ADJUSTMENT`].
pub fn validate_restock_delta(delta: i64) -> Result<()> {
    if delta == 0 {
        return Err(DomainError::validation("delta must not be zero"));
    }
    if delta.unsigned_abs() > MAX_STOCK_ADJUSTMENT.unsigned_abs() {
        return Err(DomainError::validation(format!(
            "delta must be between -{MAX_STOCK_ADJUSTMENT} and {MAX_STOCK_ADJUSTMENT}"
        )));
    }
    Ok(())
}

/// Stock total after an adjustment, or `None` on overflow.
#[must_use]
pub const fn adjusted_stock(total_available_stock: i64, delta: i64) -> Option<i64> {
    total_available_stock.checked_add(delta)
}

/// Listing filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ProductFilter {
    /// Restrict to one category
    pub category: Option<String>,
    /// Case-insensitive substring match on the name
    pub search: Option<String>,
    /// Page size
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u32>,
}

impl ProductFilter {
    /// Effective page size, clamped to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Effective offset.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Normalized category filter, if any.
    #[must_use]
    pub fn category(&self) -> Option<String> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_lowercase)
    }

    /// Normalized search term, if any.
    #[must_use]
    pub fn search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Whether a product passes this filter (ignoring paging).
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        if !product.is_active {
            return false;
        }
        if let Some(category) = self.category() {
            if product.category != category {
                return false;
            }
        }
        if let Some(search) = self.search() {
            if !product.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// A category and how many active products it holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    /// Category slug
    pub category: String,
    /// Active products in this category
    pub product_count: i64,
}

/// Catalog storage.
pub trait CatalogRepository: Send + Sync {
    /// Active products matching the filter, ordered by name.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_products(&self, filter: ProductFilter) -> BoxFuture<'_, Result<Vec<Product>>>;

    /// Fetch one product, active or not.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such product
    /// - `Database`: storage failure
    fn get_product(&self, id: ProductId) -> BoxFuture<'_, Result<Product>>;

    /// Categories of active products, alphabetical.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_categories(&self) -> BoxFuture<'_, Result<Vec<CategorySummary>>>;

    /// Insert a validated product.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, Result<Product>>;

    /// Apply a signed adjustment to `total_available_stock`.
    ///
    /// The adjustment is guarded: stock may never drop below the units
    /// currently reserved.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such product
    /// - `Conflict`: the adjustment would violate the ledger invariant
    /// - `Database`: storage failure
    fn restock(&self, id: ProductId, delta: i64) -> BoxFuture<'_, Result<StockLevel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, category: &str, active: bool) -> Product {
        Product {
            id: ProductId::new(),
            name: name.to_string(),
            description: String::new(),
            category: category.to_string(),
            price_cents: 199,
            unit: "piece".to_string(),
            image_url: None,
            is_active: active,
            total_available_stock: 10,
            buying_in_progress: 3,
            created_at: Utc::now(),
        }
    }

    fn new_product(name: &str, price_cents: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: String::new(),
            category: " Dairy ".to_string(),
            price_cents,
            unit: default_unit(),
            image_url: None,
            initial_stock: 0,
        }
    }

    #[test]
    fn validation_normalizes_category() {
        let product = new_product("  Milk ", 120).validate();
        assert!(matches!(
            product,
            Ok(NewProduct { ref name, ref category, .. }) if name == "Milk" && category == "dairy"
        ));
    }

    #[test]
    fn validation_rejects_blank_name_and_negative_price() {
        assert!(new_product("   ", 100).validate().is_err());
        assert!(new_product("Milk", -1).validate().is_err());
    }

    #[test]
    fn restock_delta_is_bounded() {
        assert!(validate_restock_delta(5).is_ok());
        assert!(validate_restock_delta(-MAX_STOCK_ADJUSTMENT).is_ok());
        for delta in [0, MAX_STOCK_ADJUSTMENT + 1, i64::MAX, i64::MIN] {
            assert!(
                matches!(validate_restock_delta(delta), Err(DomainError::Validation(_))),
                "delta {delta}"
            );
        }
    }

    #[test]
    fn adjusted_stock_reports_overflow() {
        assert_eq!(adjusted_stock(10, -4), Some(6));
        assert_eq!(adjusted_stock(i64::MAX, 1), None);
    }

    #[test]
    fn filter_limit_is_clamped() {
        assert_eq!(ProductFilter::default().limit(), DEFAULT_PAGE_SIZE);
        let filter = ProductFilter {
            limit: Some(1_000),
            ..ProductFilter::default()
        };
        assert_eq!(filter.limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn filter_hides_inactive_and_matches_search() {
        let filter = ProductFilter {
            search: Some("APP".to_string()),
            ..ProductFilter::default()
        };
        assert!(filter.matches(&product("Green Apples", "fruit", true)));
        assert!(!filter.matches(&product("Green Apples", "fruit", false)));
        assert!(!filter.matches(&product("Bananas", "fruit", true)));
    }

    #[test]
    fn available_now_subtracts_reservations() {
        assert_eq!(product("Bread", "bakery", true).available_now(), 7);
    }
}
