use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    #[serde(rename = "currencyId")]
    pub currency_id: String,
    #[serde(rename = "currencyCode")]
    pub currency_code: String,
    #[serde(rename = "currencyName")]
    pub currency_name: String,
    #[serde(rename = "currencySymbol", default)]
    pub currency_symbol: Option<String>,
    #[serde(rename = "exchangeRate", default)]
    pub exchange_rate: Option<f64>,
    #[serde(rename = "isActive", default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Currency {
    pub fn display_label(&self) -> String {
        match self.currency_symbol.as_deref() {
            Some(symbol) if !symbol.is_empty() => {
                format!("{} ({}, {})", self.currency_name, self.currency_code, symbol)
            }
            _ => format!("{} ({})", self.currency_name, self.currency_code),
        }
    }
}

/// Body for creating a currency
#[derive(Debug, Clone, Serialize)]
pub struct NewCurrency {
    #[serde(rename = "currencyCode")]
    pub currency_code: String,
    #[serde(rename = "currencyName")]
    pub currency_name: String,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

impl NewCurrency {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            currency_code: code.trim().to_string(),
            currency_name: name.trim().to_string(),
            is_active: true,
        }
    }
}
