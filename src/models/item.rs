use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How value-added tax is computed for an item or fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxRule {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    /// Tax rate in percent, e.g. 19 for 19 %.
    pub rate: Decimal,
    /// If true, listed prices already contain the tax; otherwise the tax is
    /// added on top of the listed (net) price.
    pub price_includes_tax: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub default_price: Decimal,
    /// Buyers may pay more than the listed price.
    pub free_price: bool,
    pub active: bool,
    pub requires_seat: bool,
    pub tax_rule_id: Option<Uuid>,
    #[serde(default)]
    pub variations: Vec<ItemVariation>,
}

impl Item {
    pub fn has_variations(&self) -> bool {
        !self.variations.is_empty()
    }

    pub fn variation(&self, id: Uuid) -> Option<&ItemVariation> {
        self.variations.iter().find(|v| v.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemVariation {
    pub id: Uuid,
    pub value: String,
    /// Overrides the item's default price when set.
    pub default_price: Option<Decimal>,
    pub active: bool,
}
