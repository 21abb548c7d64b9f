//! Product catalog.
//!
//! Products are shared read-only by every shopper. Administrators edit them
//! and the spreadsheet feed imports them; nothing ever deletes a product,
//! it is only disabled.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId};

/// Unit label used when a feed row has none.
pub const DEFAULT_UNIT: &str = "件";

/// Category label used when a feed row has none.
pub const DEFAULT_CATEGORY: &str = "未分類";

/// Label of the tab that shows every product.
pub const ALL_LABEL: &str = "全部";

/// Label of the tab that shows the member's favorites.
pub const FAVORITES_LABEL: &str = "我的最愛";

/// A product offered in the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub unit: String,
    pub category: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

const fn enabled_by_default() -> bool {
    true
}

impl Product {
    /// Build an enabled product with no stock count.
    #[must_use]
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Price,
        unit: impl Into<String>,
        category: impl Into<String>,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            unit: unit.into(),
            category: category.into(),
            icon: icon.into(),
            stock: None,
            enabled: true,
        }
    }
}

/// Display icon for a category, used when the feed does not provide one.
#[must_use]
pub fn icon_for_category(category: &str) -> &'static str {
    match category {
        "葉菜類" => "🥬",
        "瓜果類" => "🍅",
        "根莖類" => "🥕",
        "水果類" => "🍎",
        "菇菌類" => "🍄",
        _ => "🛒",
    }
}

/// Which slice of the catalog a shopper is browsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CategoryFilter {
    All,
    Favorites,
    Category(String),
}

impl CategoryFilter {
    /// Parse a tab label.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            ALL_LABEL => Self::All,
            FAVORITES_LABEL => Self::Favorites,
            other => Self::Category(other.to_owned()),
        }
    }

    /// Tab label for this filter.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::All => ALL_LABEL,
            Self::Favorites => FAVORITES_LABEL,
            Self::Category(name) => name,
        }
    }
}

/// The set of products currently known to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    /// Build a catalog, keeping the first occurrence of any duplicated id.
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        let mut seen = BTreeSet::new();
        let products = products
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .collect();
        Self { products }
    }

    /// The default produce catalog written when the store has none.
    #[must_use]
    pub fn seed() -> Self {
        let p = |id: &str, name: &str, price: u32, unit: &str, category: &str, icon: &str| {
            Product::new(id, name, Price::from_whole(price), unit, category, icon)
        };
        Self::new(vec![
            p("p001", "有機菠菜", 45, "包", "葉菜類", "🥬"),
            p("p002", "高山高麗菜", 80, "顆", "葉菜類", "🥗"),
            p("p003", "空心菜", 35, "把", "葉菜類", "🍃"),
            p("p004", "小黃瓜", 50, "條", "瓜果類", "🥒"),
            p("p005", "牛番茄", 75, "盒", "瓜果類", "🍅"),
            p("p006", "日本南瓜", 90, "個", "瓜果類", "🎃"),
            p("p007", "紅蘿蔔", 40, "袋", "根莖類", "🥕"),
            p("p008", "馬鈴薯", 65, "袋", "根莖類", "🥔"),
        ])
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Every product, including disabled ones.
    #[must_use]
    pub fn all(&self) -> &[Product] {
        &self.products
    }

    /// Products shoppers may see and buy.
    pub fn visible(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.enabled)
    }

    /// Look up a product by id (disabled products included).
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.id == id)
    }

    /// Distinct categories of visible products, in first-seen order.
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for product in self.visible() {
            if !out.contains(&product.category.as_str()) {
                out.push(&product.category);
            }
        }
        out
    }

    /// Browsing tabs: all, favorites, then one per category.
    #[must_use]
    pub fn tabs(&self) -> Vec<CategoryFilter> {
        let mut tabs = vec![CategoryFilter::All, CategoryFilter::Favorites];
        tabs.extend(
            self.categories()
                .into_iter()
                .map(|c| CategoryFilter::Category(c.to_owned())),
        );
        tabs
    }

    /// Number of visible products per category, in first-seen order.
    #[must_use]
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        self.categories()
            .into_iter()
            .map(|c| {
                let count = self.visible().filter(|p| p.category == c).count();
                (c.to_owned(), count)
            })
            .collect()
    }

    /// Visible products matching a browsing filter.
    #[must_use]
    pub fn filter(&self, filter: &CategoryFilter, favorites: &BTreeSet<ProductId>) -> Vec<&Product> {
        self.visible()
            .filter(|p| match filter {
                CategoryFilter::All => true,
                CategoryFilter::Favorites => favorites.contains(&p.id),
                CategoryFilter::Category(name) => &p.category == name,
            })
            .collect()
    }
}
