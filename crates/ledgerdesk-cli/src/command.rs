//! Console command parsing.

use ledgerdesk_core::i18n::Language;
use ledgerdesk_core::models::{RecordCurrency, RecordKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordTarget {
    User,
    Customer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Customers,
    CustomerAdd { name: String },
    CustomerRename { id: String, name: String },
    CustomerDelete { id: String },
    Currencies,
    CurrencyAdd { code: String, name: String },
    CurrencyDelete { id: String },
    Balances { customer_id: String },
    Link { customer_id: String, currency_id: String, amount: f64 },
    Unlink { id: String },
    Users,
    UserAdd { email: String, first_name: String, last_name: String },
    UserDelete { id: String },
    Password { target: PasswordTarget, id: String },
    Records { customer_id: Option<String> },
    Book {
        kind: RecordKind,
        customer_id: String,
        amount: f64,
        currency: RecordCurrency,
        note: String,
    },
    Lang(Language),
    Whoami,
    Logout,
    Help,
    Quit,
}

pub const USAGE: &[&str] = &[
    "customers",
    "customer add <name>",
    "customer rename <id> <name>",
    "customer delete <id>",
    "currencies",
    "currency add <code> <name>",
    "currency delete <id>",
    "balances <customer-id>",
    "link <customer-id> <currency-id> <amount>",
    "unlink <customer-currency-id>",
    "users",
    "user add <email> <first-name> <last-name>",
    "user delete <id>",
    "password user|customer <id>",
    "records [customer-id]",
    "income <customer-id> <amount> <dollar|euro> [note]",
    "outcome <customer-id> <amount> <dollar|euro> [note]",
    "lang en|tr",
    "whoami",
    "logout",
    "help",
    "quit",
];

/// Why a line could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Unknown(String),
    /// Known command, wrong arguments; carries the usage line
    Usage(&'static str),
    InvalidAmount(String),
    InvalidValue(String),
}

fn usage(prefix: &str) -> ParseError {
    let line = USAGE
        .iter()
        .find(|u| u.starts_with(prefix))
        .copied()
        .unwrap_or("help");
    ParseError::Usage(line)
}

fn parse_amount(raw: &str) -> Result<f64, ParseError> {
    match raw.replace(',', ".").parse::<f64>() {
        Ok(amount) if amount.is_finite() => Ok(amount),
        _ => Err(ParseError::InvalidAmount(raw.to_string())),
    }
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = words.split_first() else {
            return Ok(None);
        };
        // Everything after the first `skip` words, spaces preserved as typed
        let rest = |skip: usize| words.iter().skip(skip).copied().collect::<Vec<_>>().join(" ");

        let command = match (head.to_ascii_lowercase().as_str(), args) {
            ("customers", []) => Command::Customers,
            ("customer", ["add", _, ..]) => Command::CustomerAdd { name: rest(2) },
            ("customer", ["rename", id, _, ..]) => Command::CustomerRename {
                id: id.to_string(),
                name: rest(3),
            },
            ("customer", ["delete", id]) => Command::CustomerDelete { id: id.to_string() },
            ("customer", _) => return Err(usage("customer ")),

            ("currencies", []) => Command::Currencies,
            ("currency", ["add", code, _, ..]) => Command::CurrencyAdd {
                code: code.to_string(),
                name: rest(3),
            },
            ("currency", ["delete", id]) => Command::CurrencyDelete { id: id.to_string() },
            ("currency", _) => return Err(usage("currency ")),

            ("balances", [customer_id]) => Command::Balances {
                customer_id: customer_id.to_string(),
            },
            ("balances", _) => return Err(usage("balances")),
            ("link", [customer_id, currency_id, amount]) => Command::Link {
                customer_id: customer_id.to_string(),
                currency_id: currency_id.to_string(),
                amount: parse_amount(amount)?,
            },
            ("link", _) => return Err(usage("link")),
            ("unlink", [id]) => Command::Unlink { id: id.to_string() },
            ("unlink", _) => return Err(usage("unlink")),

            ("users", []) => Command::Users,
            ("user", ["add", email, first_name, last_name]) => Command::UserAdd {
                email: email.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            },
            ("user", ["delete", id]) => Command::UserDelete { id: id.to_string() },
            ("user", _) => return Err(usage("user ")),
            ("password", [target, id]) => {
                let target = match target.to_ascii_lowercase().as_str() {
                    "user" => PasswordTarget::User,
                    "customer" => PasswordTarget::Customer,
                    _ => return Err(usage("password")),
                };
                Command::Password { target, id: id.to_string() }
            }
            ("password", _) => return Err(usage("password")),

            ("records", []) => Command::Records { customer_id: None },
            ("records", [customer_id]) => Command::Records {
                customer_id: Some(customer_id.to_string()),
            },
            ("records", _) => return Err(usage("records")),
            (verb @ ("income" | "outcome"), [customer_id, amount, currency, ..]) => Command::Book {
                kind: if verb == "income" { RecordKind::Income } else { RecordKind::Outcome },
                customer_id: customer_id.to_string(),
                amount: parse_amount(amount)?,
                currency: currency.parse().map_err(ParseError::InvalidValue)?,
                note: rest(4),
            },
            ("income", _) => return Err(usage("income")),
            ("outcome", _) => return Err(usage("outcome")),

            ("lang", [code]) => Command::Lang(code.parse().map_err(ParseError::InvalidValue)?),
            ("lang", _) => return Err(usage("lang")),
            ("whoami", []) => Command::Whoami,
            ("logout", []) => Command::Logout,
            ("help" | "?", _) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            _ => return Err(ParseError::Unknown(head.to_string())),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line() {
        assert_eq!(Command::parse("   "), Ok(None));
    }

    #[test]
    fn test_multi_word_names() {
        assert_eq!(
            Command::parse("customer add  Acme   Trading Ltd").unwrap(),
            Some(Command::CustomerAdd { name: "Acme Trading Ltd".into() })
        );
        assert_eq!(
            Command::parse("currency add TRY Turkish Lira").unwrap(),
            Some(Command::CurrencyAdd { code: "TRY".into(), name: "Turkish Lira".into() })
        );
    }

    #[test]
    fn test_booking_commands() {
        assert_eq!(
            Command::parse("outcome c-1 12,50 euro rent for may").unwrap(),
            Some(Command::Book {
                kind: RecordKind::Outcome,
                customer_id: "c-1".into(),
                amount: 12.5,
                currency: RecordCurrency::Euro,
                note: "rent for may".into(),
            })
        );
        assert!(matches!(
            Command::parse("income c-1 ten dollar"),
            Err(ParseError::InvalidAmount(_))
        ));
        assert!(matches!(
            Command::parse("income c-1 10 yen"),
            Err(ParseError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_usage_errors() {
        assert_eq!(
            Command::parse("customer delete"),
            Err(ParseError::Usage("customer add <name>"))
        );
        assert_eq!(
            Command::parse("link c-1 usd"),
            Err(ParseError::Usage("link <customer-id> <currency-id> <amount>"))
        );
        assert_eq!(
            Command::parse("password admin 7"),
            Err(ParseError::Usage("password user|customer <id>"))
        );
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::parse("LOGOUT").unwrap(), Some(Command::Logout));
        assert_eq!(Command::parse("lang en").unwrap(), Some(Command::Lang(Language::En)));
        assert_eq!(
            Command::parse("records c-9").unwrap(),
            Some(Command::Records { customer_id: Some("c-9".into()) })
        );
        assert_eq!(Command::parse("frobnicate"), Err(ParseError::Unknown("frobnicate".into())));
    }
}
