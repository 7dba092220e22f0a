use serde::{Deserialize, Serialize};

/// Catalog entry as seen by the payment core. Owned by the storefront; never
/// mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub company: Option<String>,
    pub price: i64,
}

impl Product {
    /// Name shown to customers, e.g. "Balance 2023 (Acme Ltd.)".
    pub fn display_name(&self) -> String {
        match &self.company {
            Some(company) if !company.trim().is_empty() => format!("{} ({})", self.name, company),
            _ => self.name.clone(),
        }
    }
}
