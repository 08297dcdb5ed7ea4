//! API client for communicating with the ledger REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests against the customer, currency, user and financial record
//! endpoints.
//!
//! Clones of a client share one unauthorized hook slot. Whatever is
//! installed there sees every 401 any clone receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::models::{
    Currency, Customer, CustomerCurrency, FinancialRecord, LinkCurrency, LoginResponse,
    NewCurrency, NewCustomer, NewFinancialRecord, NewUser, PasswordChange, RecordCurrency,
    UserAccount,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Minimum password length accepted by the server
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Callback run whenever a response comes back 401
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Identifies an installed hook so only its installer can remove it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookId(u64);

#[derive(Default)]
struct InterceptorSlot {
    hook: RwLock<Option<(HookId, UnauthorizedHook)>>,
    next_id: AtomicU64,
}

impl InterceptorSlot {
    fn install(&self, hook: UnauthorizedHook) -> Option<HookId> {
        let Ok(mut slot) = self.hook.write() else {
            warn!("Interceptor lock poisoned; hook not installed");
            return None;
        };
        if slot.is_some() {
            return None;
        }
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        *slot = Some((id, hook));
        Some(id)
    }

    fn uninstall(&self, id: HookId) -> bool {
        match self.hook.write() {
            Ok(mut slot) if slot.as_ref().map(|(installed, _)| *installed) == Some(id) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    fn current(&self) -> Option<UnauthorizedHook> {
        self.hook
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|(_, hook)| Arc::clone(hook)))
    }
}

/// API client for the ledger service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<String>>,
    interceptor: Arc<InterceptorSlot>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (e.g. `https://host/api`)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            token: None,
            interceptor: Arc::new(InterceptorSlot::default()),
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.map(Arc::new);
    }

    /// Create a new ApiClient with the given token, sharing the connection
    /// pool and the unauthorized hook.
    pub fn with_token(&self, token: Option<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: Arc::clone(&self.base_url),
            token: token.map(Arc::new),
            interceptor: Arc::clone(&self.interceptor),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ===== Unauthorized interception =====

    /// Install the 401 hook. Returns `None` if a hook is already installed,
    /// so repeated installs never stack.
    pub fn install_unauthorized_hook(&self, hook: UnauthorizedHook) -> Option<HookId> {
        let id = self.interceptor.install(hook);
        debug!(installed = id.is_some(), "Unauthorized hook install requested");
        id
    }

    /// Remove the hook, but only if `id` is the one currently installed
    pub fn remove_unauthorized_hook(&self, id: HookId) -> bool {
        self.interceptor.uninstall(id)
    }

    pub fn has_unauthorized_hook(&self) -> bool {
        self.interceptor.current().is_some()
    }

    /// Feed a response status through the interceptor
    pub fn observe_status(&self, status: StatusCode) {
        if status == StatusCode::UNAUTHORIZED {
            if let Some(hook) = self.interceptor.current() {
                warn!("Received 401 from ledger API");
                hook();
            }
        }
    }

    // ===== Request plumbing =====

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(&self, response: reqwest::Response) -> Result<Option<reqwest::Response>> {
        let status = response.status();
        self.observe_status(status);

        if status.is_success() {
            Ok(Some(response))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .headers(self.auth_headers()?);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            match self.check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn request_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let response = self.send(method, path, body).await?;
        let text = response.text().await.context("Failed to read response body")?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    /// For endpoints whose success body is irrelevant (often 204)
    async fn request_empty<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()> {
        self.send(method, path, body).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json::<T, ()>(Method::GET, path, None).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.request_empty::<()>(Method::DELETE, path, None).await
    }

    // ===== Auth and users =====

    /// Exchange credentials for a bearer token and identity record
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::Validation("Email and password are required".into()).into());
        }
        let body = serde_json::json!({ "email": email, "password": password });
        self.request_json(Method::POST, "auth/login", Some(&body)).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserAccount>> {
        self.get("auth/users").await
    }

    pub async fn register_user(&self, user: &NewUser) -> Result<()> {
        validate_user(user)?;
        validate_password(&user.user_password)?;
        self.request_empty(Method::POST, "auth/register", Some(user)).await
    }

    pub async fn update_user(&self, user_id: &str, user: &NewUser) -> Result<()> {
        validate_user(user)?;
        self.request_empty(Method::PUT, &format!("auth/users/{}", user_id), Some(user))
            .await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.delete(&format!("auth/users/{}", user_id)).await
    }

    pub async fn set_user_password(&self, user_id: &str, password: &str) -> Result<()> {
        validate_password(password)?;
        let body = PasswordChange { password: password.to_string() };
        self.request_empty(Method::POST, &format!("auth/users/{}/set-password", user_id), Some(&body))
            .await
    }

    pub async fn set_customer_password(&self, customer_id: &str, password: &str) -> Result<()> {
        validate_password(password)?;
        let body = PasswordChange { password: password.to_string() };
        self.request_empty(
            Method::POST,
            &format!("auth/customers/{}/set-password", customer_id),
            Some(&body),
        )
        .await
    }

    // ===== Customers =====

    pub async fn list_customers(&self) -> Result<Vec<Customer>> {
        self.get("customer").await
    }

    /// Create a customer, optionally opening a balance in one currency.
    /// A failed balance link is logged and does not fail the creation.
    pub async fn create_customer(&self, name: &str, opening_balance: Option<(&str, f64)>) -> Result<Customer> {
        let body = NewCustomer::named(name);
        if body.customer_name.is_empty() {
            return Err(ApiError::Validation("Customer name is required.".into()).into());
        }
        let customer: Customer = self.request_json(Method::POST, "customer", Some(&body)).await?;

        if let Some((currency_id, amount)) = opening_balance.filter(|(id, amount)| !id.is_empty() && *amount > 0.0) {
            if let Err(e) = self.link_currency(&customer.customer_id, currency_id, amount).await {
                warn!(customer = %customer.customer_id, error = %e, "Failed to link opening balance");
            }
        }
        Ok(customer)
    }

    pub async fn update_customer(&self, customer: &Customer) -> Result<()> {
        let mut body = customer.clone();
        body.customer_name = body.customer_name.trim().to_string();
        if body.customer_name.is_empty() {
            return Err(ApiError::Validation("Customer name is required.".into()).into());
        }
        self.request_empty(Method::PUT, &format!("customer/{}", customer.customer_id), Some(&body))
            .await
    }

    pub async fn delete_customer(&self, customer_id: &str) -> Result<()> {
        self.delete(&format!("customer/{}", customer_id)).await
    }

    // ===== Currencies =====

    pub async fn list_currencies(&self) -> Result<Vec<Currency>> {
        self.get("currency").await
    }

    pub async fn create_currency(&self, code: &str, name: &str) -> Result<()> {
        let body = NewCurrency::new(code, name);
        if body.currency_code.is_empty() || body.currency_name.is_empty() {
            return Err(ApiError::Validation("Please fill in all required fields".into()).into());
        }
        self.request_empty(Method::POST, "currency", Some(&body)).await
    }

    pub async fn update_currency(&self, currency: &Currency) -> Result<()> {
        self.request_empty(Method::PUT, &format!("currency/{}", currency.currency_id), Some(currency))
            .await
    }

    pub async fn delete_currency(&self, currency_id: &str) -> Result<()> {
        self.delete(&format!("currency/{}", currency_id)).await
    }

    // ===== Customer currencies =====

    pub async fn list_customer_currencies(&self, customer_id: &str) -> Result<Vec<CustomerCurrency>> {
        self.get(&format!("customercurrency/customer/{}", customer_id)).await
    }

    /// Fetch balances for several customers concurrently.
    /// Customers whose balances fail to load are left out.
    pub async fn balances_for(&self, customers: &[Customer]) -> HashMap<String, Vec<CustomerCurrency>> {
        let fetches = customers.iter().map(|c| async move {
            let result = self.list_customer_currencies(&c.customer_id).await;
            (c.customer_id.clone(), result)
        });

        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(balances) => Some((id, balances)),
                Err(e) => {
                    warn!(customer = %id, error = %e, "Failed to fetch customer balances");
                    None
                }
            })
            .collect()
    }

    pub async fn link_currency(&self, customer_id: &str, currency_id: &str, amount: f64) -> Result<()> {
        if customer_id.is_empty() || currency_id.is_empty() {
            return Err(ApiError::Validation("Please select a customer first".into()).into());
        }
        let body = LinkCurrency {
            customer_id: customer_id.to_string(),
            currency_id: currency_id.to_string(),
            amount,
        };
        self.request_empty(Method::POST, "customercurrency", Some(&body)).await
    }

    pub async fn unlink_currency(&self, customer_currency_id: &str) -> Result<()> {
        self.delete(&format!("customercurrency/{}", customer_currency_id)).await
    }

    // ===== Financial records =====

    pub async fn list_financial_records(&self) -> Result<Vec<FinancialRecord>> {
        self.get("financialrecord").await
    }

    pub async fn list_customer_records(&self, customer_id: &str) -> Result<Vec<FinancialRecord>> {
        let records = self.list_financial_records().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.customer_id == customer_id)
            .collect())
    }

    pub async fn add_income(&self, customer_id: &str, amount: f64, currency: RecordCurrency, note: &str) -> Result<()> {
        validate_amount(customer_id, amount)?;
        let body = NewFinancialRecord::income(customer_id, amount, currency, note);
        self.request_empty(Method::POST, "financialrecord", Some(&body)).await
    }

    pub async fn add_outcome(&self, customer_id: &str, amount: f64, currency: RecordCurrency, note: &str) -> Result<()> {
        validate_amount(customer_id, amount)?;
        let body = NewFinancialRecord::outcome(customer_id, amount, currency, note);
        self.request_empty(Method::POST, "financialrecord", Some(&body)).await
    }
}

// ============================================================================
// Client-side validation
// ============================================================================

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn validate_user(user: &NewUser) -> Result<(), ApiError> {
    if user.email.trim().is_empty() || !user.email.contains('@') {
        return Err(ApiError::Validation("A valid email address is required".into()));
    }
    Ok(())
}

fn validate_amount(customer_id: &str, amount: f64) -> Result<(), ApiError> {
    if customer_id.is_empty() {
        return Err(ApiError::Validation("Please select a customer first".into()));
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ApiError::Validation("Amount must be greater than zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serve canned responses on a local port and report each raw request.
    async fn stub_server(status_line: &'static str, body: &'static str) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    loop {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(head_end) = find_head_end(&buf) {
                            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
                            let length = head
                                .lines()
                                .find_map(|l| l.strip_prefix("content-length:"))
                                .and_then(|v| v.trim().parse::<usize>().ok())
                                .unwrap_or(0);
                            if buf.len() >= head_end + 4 + length {
                                break;
                            }
                        }
                    }
                    let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}/api", addr), rx)
    }

    fn find_head_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn counting_hook() -> (UnauthorizedHook, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let hook: UnauthorizedHook = Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hook, count)
    }

    #[test]
    fn test_hook_installs_once_per_client_family() {
        let client = ApiClient::new("http://localhost/api").unwrap();
        let sibling = client.with_token(Some("t".into()));
        let (first, _) = counting_hook();
        let (second, _) = counting_hook();

        let id = client.install_unauthorized_hook(first).unwrap();
        assert!(sibling.install_unauthorized_hook(second).is_none());
        assert!(sibling.has_unauthorized_hook());

        assert!(!client.remove_unauthorized_hook(HookId(id.0 + 1)));
        assert!(sibling.remove_unauthorized_hook(id));
        assert!(!client.has_unauthorized_hook());
    }

    #[test]
    fn test_independent_clients_have_independent_slots() {
        let a = ApiClient::new("http://localhost/api").unwrap();
        let b = ApiClient::new("http://localhost/api").unwrap();
        let (hook_a, _) = counting_hook();
        let (hook_b, _) = counting_hook();
        assert!(a.install_unauthorized_hook(hook_a).is_some());
        assert!(b.install_unauthorized_hook(hook_b).is_some());
    }

    #[test]
    fn test_observe_status_only_fires_on_401() {
        let client = ApiClient::new("http://localhost/api").unwrap();
        let (hook, count) = counting_hook();
        client.install_unauthorized_hook(hook);

        client.observe_status(StatusCode::OK);
        client.observe_status(StatusCode::FORBIDDEN);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        client.observe_status(StatusCode::UNAUTHORIZED);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("https://ledger.example/api/").unwrap();
        assert_eq!(client.url("customer"), "https://ledger.example/api/customer");
        assert_eq!(client.url("/auth/users"), "https://ledger.example/api/auth/users");
    }

    #[tokio::test]
    async fn test_unauthorized_response_runs_hook() {
        let (base_url, _requests) = stub_server("401 Unauthorized", "").await;
        let client = ApiClient::new(&base_url).unwrap().with_token(Some("stale".into()));
        let (hook, count) = counting_hook();
        client.install_unauthorized_hook(hook);

        let err = client.list_customers().await.unwrap_err();
        assert!(err.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let (base_url, mut requests) = stub_server("200 OK", r#"[{"customerId": "c-1", "customerName": "Acme", "customerAmount": 3}]"#).await;
        let client = ApiClient::new(&base_url).unwrap().with_token(Some("tok-123".into()));

        let customers = client.list_customers().await.unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].customer_name, "Acme");

        let request = requests.recv().await.unwrap().to_lowercase();
        assert!(request.starts_with("get /api/customer "));
        assert!(request.contains("authorization: bearer tok-123"));
    }

    #[tokio::test]
    async fn test_outcome_is_posted_with_negated_amounts() {
        let (base_url, mut requests) = stub_server("201 Created", "{}").await;
        let client = ApiClient::new(&base_url).unwrap().with_token(Some("t".into()));

        client.add_outcome("c-9", 12.5, RecordCurrency::Euro, "fee").await.unwrap();

        let request = requests.recv().await.unwrap();
        let body = &request[find_head_end(request.as_bytes()).unwrap() + 4..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["euroAmount"], serde_json::json!(-12.5));
        assert_eq!(json["outcome"], serde_json::json!(12.5));
        assert_eq!(json["total"], serde_json::json!(-12.5));
    }

    #[tokio::test]
    async fn test_bad_request_surfaces_server_message() {
        let (base_url, _requests) = stub_server("400 Bad Request", r#"{"message": "Currency code already exists"}"#).await;
        let client = ApiClient::new(&base_url).unwrap();

        let err = client.create_currency("USD", "Dollar").await.unwrap_err();
        assert_eq!(err.to_string(), "Request rejected: Currency code already exists");
    }

    #[tokio::test]
    async fn test_validation_happens_before_sending() {
        // Nothing listens here; validation must fail first
        let client = ApiClient::new("http://127.0.0.1:9/api").unwrap();

        let err = client.create_customer("   ", None).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Validation(_))));

        let err = client.set_user_password("u-1", "12345").await.unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 6 characters");

        let err = client.add_income("c-1", 0.0, RecordCurrency::Dollar, "").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Validation(_))));

        let err = client.create_currency("USD", " ").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Validation(_))));
    }
}
