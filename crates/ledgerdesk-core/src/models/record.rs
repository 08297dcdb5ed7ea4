use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Customer, UserAccount};

/// Currency column a transaction is booked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordCurrency {
    Dollar,
    Euro,
}

impl FromStr for RecordCurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dollar" | "usd" | "$" => Ok(Self::Dollar),
            "euro" | "eur" | "€" => Ok(Self::Euro),
            other => Err(format!("Unknown record currency: {}", other)),
        }
    }
}

impl fmt::Display for RecordCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dollar => write!(f, "dollar"),
            Self::Euro => write!(f, "euro"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Income,
    Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    #[serde(rename = "financialRecordId")]
    pub financial_record_id: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(rename = "customerId")]
    pub customer_id: String,
    #[serde(rename = "dateTime", default)]
    pub date_time: String,
    #[serde(rename = "dollarAmount", default)]
    pub dollar_amount: f64,
    #[serde(rename = "euroAmount", default)]
    pub euro_amount: f64,
    #[serde(default)]
    pub income: f64,
    #[serde(default)]
    pub outcome: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub remaining: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub user: Option<UserAccount>,
}

impl FinancialRecord {
    pub fn kind(&self) -> RecordKind {
        if self.outcome > 0.0 || (self.income == 0.0 && self.total < 0.0) {
            RecordKind::Outcome
        } else {
            RecordKind::Income
        }
    }

    /// Absolute amount moved, with the currency column it was booked in
    pub fn amount(&self) -> (f64, RecordCurrency) {
        if self.euro_amount != 0.0 && self.dollar_amount == 0.0 {
            (self.euro_amount.abs(), RecordCurrency::Euro)
        } else {
            (self.dollar_amount.abs(), RecordCurrency::Dollar)
        }
    }

    /// Name of the staff member who booked the record, if the server embedded it
    pub fn booked_by(&self) -> Option<String> {
        self.user.as_ref().map(UserAccount::full_name)
    }
}

/// Body for booking an income or outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFinancialRecord {
    #[serde(rename = "customerId")]
    pub customer_id: String,
    #[serde(rename = "dollarAmount")]
    pub dollar_amount: f64,
    #[serde(rename = "euroAmount")]
    pub euro_amount: f64,
    pub income: f64,
    pub outcome: f64,
    pub total: f64,
    pub remaining: f64,
    pub note: String,
}

impl NewFinancialRecord {
    pub fn income(customer_id: &str, amount: f64, currency: RecordCurrency, note: &str) -> Self {
        let (dollar_amount, euro_amount) = split_by_currency(amount, currency);
        Self {
            customer_id: customer_id.to_string(),
            dollar_amount,
            euro_amount,
            income: amount,
            outcome: 0.0,
            total: amount,
            remaining: amount,
            note: note.to_string(),
        }
    }

    /// Outcomes book negative currency amounts and totals
    pub fn outcome(customer_id: &str, amount: f64, currency: RecordCurrency, note: &str) -> Self {
        let (dollar_amount, euro_amount) = split_by_currency(-amount, currency);
        Self {
            customer_id: customer_id.to_string(),
            dollar_amount,
            euro_amount,
            income: 0.0,
            outcome: amount,
            total: -amount,
            remaining: -amount,
            note: note.to_string(),
        }
    }
}

fn split_by_currency(amount: f64, currency: RecordCurrency) -> (f64, f64) {
    match currency {
        RecordCurrency::Dollar => (amount, 0.0),
        RecordCurrency::Euro => (0.0, amount),
    }
}
