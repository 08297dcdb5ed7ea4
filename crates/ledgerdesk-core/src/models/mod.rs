//! Data models for the ledger API.
//!
//! This module contains the structures exchanged with the ledger service:
//!
//! - `Customer`, `CustomerCurrency`: customers and their per-currency balances
//! - `Currency`: currencies the ledger knows about
//! - `UserAccount`, `UserIdentity`: staff accounts and the signed-in identity
//! - `FinancialRecord`: income and outcome transactions

pub mod currency;
pub mod customer;
pub mod record;
pub mod user;

pub use currency::{Currency, NewCurrency};
pub use customer::{Customer, CustomerCurrency, LinkCurrency, NewCustomer};
pub use record::{FinancialRecord, NewFinancialRecord, RecordCurrency, RecordKind};
pub use user::{LoginResponse, NewUser, PasswordChange, UserAccount, UserIdentity};
