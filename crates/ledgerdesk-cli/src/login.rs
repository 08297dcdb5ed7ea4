//! Interactive sign-in.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info, warn};

use ledgerdesk_core::api::ApiError;
use ledgerdesk_core::auth::{CredentialStore, SessionStore};
use ledgerdesk_core::i18n::t;
use ledgerdesk_core::models::UserIdentity;
use ledgerdesk_core::{ApiClient, Config};

pub type Input = Lines<BufReader<Stdin>>;

/// Print a prompt and read one line. `None` at end of input.
pub async fn prompt_line(input: &mut Input, prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let line = input.next_line().await.context("Failed to read input")?;
    Ok(line.map(|l| l.trim().to_string()))
}

pub async fn prompt_password(prompt: &str) -> Result<String> {
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
        .await
        .context("Password prompt task failed")?
        .context("Failed to read password")
}

async fn confirm(input: &mut Input, question: &str, default_yes: bool) -> Result<bool> {
    let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    let answer = prompt_line(input, &format!("{} {}: ", question, hint)).await?;
    Ok(match answer.as_deref().map(str::to_lowercase).as_deref() {
        Some("y" | "yes" | "e" | "evet") => true,
        Some("") | None => default_yes,
        Some(_) => false,
    })
}

/// Identity record to keep for this login. Falls back to the email alone
/// when the server sent nothing usable.
fn identity_from_login(email: &str, user: Option<&serde_json::Value>) -> UserIdentity {
    user.and_then(|value| UserIdentity::from_stored(&value.to_string()))
        .filter(|identity| !identity.email.is_empty())
        .unwrap_or_else(|| UserIdentity {
            email: email.to_string(),
            ..Default::default()
        })
}

fn login_error_message(session: &SessionStore, err: &anyhow::Error) -> String {
    let language = session.language();
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Unauthorized) | Some(ApiError::BadRequest(_)) => {
            t(language, "login.invalidCredentials").to_string()
        }
        _ => format!("{}: {}", t(language, "login.failed"), err),
    }
}

/// Prompt until a login succeeds. Returns `None` when input ends.
pub async fn sign_in(
    input: &mut Input,
    config: &mut Config,
    client: &ApiClient,
    session: &SessionStore,
) -> Result<Option<UserIdentity>> {
    loop {
        let language = session.language();
        println!("\n=== Ledgerdesk: {} ===", t(language, "login.subtitle"));

        let label = t(language, "login.emailLabel");
        let prompt = match config.last_email {
            Some(ref last) => format!("{} [{}]: ", label, last),
            None => format!("{}: ", label),
        };
        let Some(typed) = prompt_line(input, &prompt).await? else {
            return Ok(None);
        };
        let email = match (typed.is_empty(), config.last_email.as_ref()) {
            (true, Some(last)) => last.clone(),
            _ => typed,
        };
        if email.is_empty() {
            continue;
        }

        let saved = CredentialStore::recall(&email).unwrap_or_else(|e| {
            warn!(error = %e, "Keychain unavailable");
            None
        });
        let password = match saved {
            Some(saved) if confirm(input, t(language, "login.useSaved"), true).await? => saved,
            _ => prompt_password(&format!("{}: ", t(language, "login.passwordLabel"))).await?,
        };

        println!("{}", t(language, "login.signingIn"));
        let response = match client.login(&email, &password).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Login failed");
                println!("{}", login_error_message(session, &e));
                continue;
            }
        };

        let identity = identity_from_login(&email, response.user.as_ref());
        session
            .establish(&response.token, &identity)
            .context("Failed to store session")?;

        let remember = confirm(input, t(language, "login.rememberMe"), false).await?;
        let keychain = if remember {
            CredentialStore::remember(&email, &password)
        } else {
            CredentialStore::forget(&email)
        };
        if let Err(e) = keychain {
            warn!(error = %e, "Failed to update saved password");
        }

        config.last_email = Some(email);
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }

        info!(user = %identity.email, "Login successful");
        println!("{} {}", t(language, "login.success"), identity.display_name());
        return Ok(Some(identity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_prefers_server_record() {
        let user = json!({"Email": "ayse@example.com", "firstName": "Ayşe", "userId": 4});
        let identity = identity_from_login("typed@example.com", Some(&user));
        assert_eq!(identity.email, "ayse@example.com");
        assert_eq!(identity.display_name(), "Ayşe");
    }

    #[test]
    fn test_identity_falls_back_to_typed_email() {
        assert_eq!(identity_from_login("typed@example.com", None).email, "typed@example.com");
        let identity = identity_from_login("typed@example.com", Some(&json!("not an object")));
        assert_eq!(identity.email, "typed@example.com");
    }
}
