//! The interactive command loop for one signed-in session.

use std::io::{self, Write};

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ledgerdesk_core::auth::{ActivityKind, GuardState, LogoutReason, SessionGuard};
use ledgerdesk_core::i18n::{t, Language};
use ledgerdesk_core::models::{FinancialRecord, NewUser, RecordKind, UserIdentity};
use ledgerdesk_core::utils::{cmp_ignore_case, format_amount, format_date, truncate};
use ledgerdesk_core::ApiClient;

use crate::command::{Command, ParseError, PasswordTarget, USAGE};
use crate::login::{prompt_password, Input};

/// How a console session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// Operator quit or input closed; the stored session is left alone
    Quit,
    /// Session is over and the login prompt should come back
    SignedOut(Option<LogoutReason>),
}

pub struct Console<'a> {
    client: &'a ApiClient,
    guard: &'a SessionGuard,
    identity: UserIdentity,
}

impl<'a> Console<'a> {
    pub fn new(client: &'a ApiClient, guard: &'a SessionGuard, identity: UserIdentity) -> Self {
        Self { client, guard, identity }
    }

    fn language(&self) -> Language {
        self.guard.session().language()
    }

    fn say(&self, key: &str) {
        println!("{}", t(self.language(), key));
    }

    /// Read and run commands until the session ends.
    /// `navigations` receives the guard's redirects to the login view.
    pub async fn run(&self, input: &mut Input, navigations: &mut mpsc::UnboundedReceiver<String>) -> Result<SessionEnd> {
        println!(
            "{}, {}. {}",
            t(self.language(), "nav.welcome"),
            self.identity.display_name(),
            t(self.language(), "console.prompt")
        );

        loop {
            print!("ledgerdesk> ");
            io::stdout().flush()?;

            tokio::select! {
                line = input.next_line() => {
                    let Some(line) = line? else {
                        return Ok(SessionEnd::Quit);
                    };
                    self.guard.record_activity(ActivityKind::KeyDown);

                    let command = match Command::parse(&line) {
                        Ok(Some(command)) => command,
                        Ok(None) => continue,
                        Err(e) => {
                            self.report_parse_error(&e);
                            continue;
                        }
                    };
                    debug!(?command, "Running command");
                    match self.execute(command).await {
                        Ok(Some(end)) => return Ok(end),
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "Command failed");
                            println!("{}: {}", t(self.language(), "msg.error"), e);
                        }
                    }
                }
                Some(path) = navigations.recv() => {
                    info!(%path, "Returning to login");
                    println!();
                    return Ok(self.signed_out());
                }
            }
        }
    }

    /// The guard's logout, with its notice printed
    fn signed_out(&self) -> SessionEnd {
        let reason = self.guard.subscribe_logouts().borrow().clone();
        if let Some(ref reason) = reason {
            self.say(reason.message_key());
        }
        SessionEnd::SignedOut(reason)
    }

    /// `Some` once the guard has ended the session; requests must not go out then
    fn ended(&self) -> Option<SessionEnd> {
        if self.guard.state() == GuardState::Authenticated {
            return None;
        }
        debug!(state = ?self.guard.state(), "Session ended while a command was pending");
        Some(self.signed_out())
    }

    fn report_parse_error(&self, err: &ParseError) {
        let language = self.language();
        match err {
            ParseError::Unknown(word) => println!("{}: {}", t(language, "console.unknownCommand"), word),
            ParseError::Usage(line) => println!("{}: {}", t(language, "console.usage"), line),
            ParseError::InvalidAmount(raw) => println!("{}: {}", t(language, "msg.error"), raw),
            ParseError::InvalidValue(message) => println!("{}: {}", t(language, "msg.error"), message),
        }
    }

    async fn execute(&self, command: Command) -> Result<Option<SessionEnd>> {
        if !matches!(command, Command::Help | Command::Quit) {
            if let Some(end) = self.ended() {
                return Ok(Some(end));
            }
        }

        let client = self.client;
        match command {
            Command::Customers => self.show_customers().await?,
            Command::CustomerAdd { name } => {
                let customer = client.create_customer(&name, None).await?;
                println!("{} ({})", t(self.language(), "msg.customerCreated"), customer.customer_id);
            }
            Command::CustomerRename { id, name } => {
                let customers = client.list_customers().await?;
                let Some(mut customer) = customers.into_iter().find(|c| c.customer_id == id) else {
                    println!("{}: {}", t(self.language(), "msg.notFound"), id);
                    return Ok(None);
                };
                customer.customer_name = name;
                client.update_customer(&customer).await?;
                self.say("msg.updated");
            }
            Command::CustomerDelete { id } => {
                client.delete_customer(&id).await?;
                self.say("msg.deleted");
            }
            Command::Currencies => {
                let currencies = client.list_currencies().await?;
                if currencies.is_empty() {
                    self.say("currency.noCurrencies");
                }
                for currency in currencies {
                    let status = if currency.is_active { "" } else { " (inactive)" };
                    println!("{:<38} {}{}", currency.currency_id, currency.display_label(), status);
                }
            }
            Command::CurrencyAdd { code, name } => {
                client.create_currency(&code, &name).await?;
                self.say("msg.currencyCreated");
            }
            Command::CurrencyDelete { id } => {
                client.delete_currency(&id).await?;
                self.say("msg.deleted");
            }
            Command::Balances { customer_id } => {
                for balance in client.list_customer_currencies(&customer_id).await? {
                    println!("{:<38} {}", balance.customer_currency_id, balance.display_balance());
                }
            }
            Command::Link { customer_id, currency_id, amount } => {
                client.link_currency(&customer_id, &currency_id, amount).await?;
                self.say("msg.currencyLinked");
            }
            Command::Unlink { id } => {
                client.unlink_currency(&id).await?;
                self.say("msg.deleted");
            }
            Command::Users => {
                let mut users = client.list_users().await?;
                if users.is_empty() {
                    self.say("user.noUsers");
                }
                users.sort_by(|a, b| cmp_ignore_case(&a.full_name(), &b.full_name()));
                for user in users {
                    println!("{:<38} {:<28} {}", user.user_id, truncate(&user.full_name(), 28), user.email);
                }
            }
            Command::UserAdd { email, first_name, last_name } => {
                let password = prompt_password(&format!("{}: ", t(self.language(), "user.password"))).await?;
                if let Some(end) = self.ended() {
                    return Ok(Some(end));
                }
                let user = NewUser {
                    email,
                    user_first_name: first_name,
                    user_last_name: last_name,
                    user_password: password,
                };
                client.register_user(&user).await?;
                self.say("msg.userCreated");
            }
            Command::UserDelete { id } => {
                client.delete_user(&id).await?;
                self.say("msg.deleted");
            }
            Command::Password { target, id } => {
                let password = prompt_password(&format!("{}: ", t(self.language(), "user.password"))).await?;
                if let Some(end) = self.ended() {
                    return Ok(Some(end));
                }
                match target {
                    PasswordTarget::User => client.set_user_password(&id, &password).await?,
                    PasswordTarget::Customer => client.set_customer_password(&id, &password).await?,
                }
                self.say("msg.passwordChanged");
            }
            Command::Records { customer_id } => {
                let records = match customer_id {
                    Some(ref id) => client.list_customer_records(id).await?,
                    None => client.list_financial_records().await?,
                };
                self.show_records(&records);
            }
            Command::Book { kind, customer_id, amount, currency, note } => match kind {
                RecordKind::Income => {
                    client.add_income(&customer_id, amount, currency, &note).await?;
                    self.say("msg.incomeAdded");
                }
                RecordKind::Outcome => {
                    client.add_outcome(&customer_id, amount, currency, &note).await?;
                    self.say("msg.outcomeAdded");
                }
            },
            Command::Lang(language) => {
                self.guard.session().set_language(language)?;
                self.say("console.languageChanged");
            }
            Command::Whoami => {
                let role = if self.identity.is_admin { "admin" } else { "staff" };
                println!("{} <{}> ({})", self.identity.display_name(), self.identity.email, role);
            }
            Command::Logout => {
                info!("Operator signed out");
                self.guard.stop();
                self.guard.session().terminate()?;
                self.say("session.signedOut");
                return Ok(Some(SessionEnd::SignedOut(None)));
            }
            Command::Help => {
                for line in USAGE {
                    println!("  {}", line);
                }
            }
            Command::Quit => return Ok(Some(SessionEnd::Quit)),
        }
        Ok(None)
    }

    async fn show_customers(&self) -> Result<()> {
        let mut customers = self.client.list_customers().await?;
        if customers.is_empty() {
            self.say("customer.noCustomersYet");
            return Ok(());
        }
        customers.sort_by(|a, b| cmp_ignore_case(&a.customer_name, &b.customer_name));

        println!("{}", t(self.language(), "customer.allCustomers"));
        let balances = self.client.balances_for(&customers).await;
        for customer in &customers {
            let summary = balances
                .get(&customer.customer_id)
                .map(|list| list.iter().map(|b| b.display_balance()).collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            println!(
                "{:<38} {:<32} {}",
                customer.customer_id,
                truncate(&customer.customer_name, 32),
                summary
            );
        }
        Ok(())
    }

    fn show_records(&self, records: &[FinancialRecord]) {
        let language = self.language();
        if records.is_empty() {
            println!("{}", t(language, "records.noRecords"));
            return;
        }
        for record in records {
            let kind = match record.kind() {
                RecordKind::Income => t(language, "records.input"),
                RecordKind::Outcome => t(language, "records.output"),
            };
            let (amount, currency) = record.amount();
            let currency_key = format!("currency.{}", currency);
            println!(
                "{:<16} {:<8} {:>14} {:<6} {:<30} {}",
                format_date(&record.date_time),
                kind,
                format_amount(amount),
                t(language, &currency_key),
                truncate(record.note.as_deref().unwrap_or(""), 30),
                record.booked_by().unwrap_or_default()
            );
        }
    }
}
