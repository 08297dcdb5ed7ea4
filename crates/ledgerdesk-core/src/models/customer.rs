use serde::{Deserialize, Serialize};

use super::Currency;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "customerId")]
    pub customer_id: String,
    #[serde(rename = "customerName")]
    pub customer_name: String,
    #[serde(rename = "customerAmount", default)]
    pub customer_amount: f64,
}

/// Body for creating a customer
#[derive(Debug, Clone, Serialize)]
pub struct NewCustomer {
    #[serde(rename = "customerName")]
    pub customer_name: String,
    #[serde(rename = "customerAmount")]
    pub customer_amount: f64,
}

impl NewCustomer {
    pub fn named(name: &str) -> Self {
        Self {
            customer_name: name.trim().to_string(),
            customer_amount: 0.0,
        }
    }
}

/// A customer's balance in one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerCurrency {
    #[serde(rename = "customerCurrencyId")]
    pub customer_currency_id: String,
    #[serde(rename = "customerId")]
    pub customer_id: String,
    #[serde(rename = "currencyId")]
    pub currency_id: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<Currency>,
}

impl CustomerCurrency {
    /// Balance formatted with the currency code when the server embedded it
    pub fn display_balance(&self) -> String {
        match self.currency {
            Some(ref currency) => format!("{:.2} {}", self.amount, currency.currency_code),
            None => format!("{:.2} ({})", self.amount, self.currency_id),
        }
    }
}

/// Body for linking a currency balance to a customer
#[derive(Debug, Clone, Serialize)]
pub struct LinkCurrency {
    #[serde(rename = "customerId")]
    pub customer_id: String,
    #[serde(rename = "currencyId")]
    pub currency_id: String,
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_customer_currency_with_embedded_currency() {
        let json = r#"{
            "customerCurrencyId": "cc-1",
            "customerId": "c-1",
            "currencyId": "usd",
            "amount": 125.5,
            "currency": {"currencyId": "usd", "currencyCode": "USD", "currencyName": "Dollar", "currencySymbol": "$", "exchangeRate": 1.0, "isActive": true}
        }"#;

        let link: CustomerCurrency = serde_json::from_str(json).unwrap();
        assert_eq!(link.display_balance(), "125.50 USD");
    }

    #[test]
    fn test_customer_amount_defaults_to_zero() {
        let customer: Customer =
            serde_json::from_str(r#"{"customerId": "c-1", "customerName": "Acme"}"#).unwrap();
        assert_eq!(customer.customer_amount, 0.0);
    }

    #[test]
    fn test_new_customer_trims_name() {
        let body = serde_json::to_value(NewCustomer::named("  Acme Ltd ")).unwrap();
        assert_eq!(body, serde_json::json!({"customerName": "Acme Ltd", "customerAmount": 0.0}));
    }
}
