use async_trait::async_trait;
use ledgerlink_core::{AccountId, LinkToken, Money, RemoteId, TokenPair, TransactionRecord};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AggregatorError;
use crate::types::{
    Account, Aggregator, ItemDetails, LinkMode, LinkTokenRequest, TransactionsPage, TransactionsRequest,
};

const API_VERSION: &str = "2020-09-14";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Development,
    Production,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox.plaid.com",
            Environment::Development => "https://development.plaid.com",
            Environment::Production => "https://production.plaid.com",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Sandbox => write!(f, "sandbox"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" => Ok(Environment::Sandbox),
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            other => Err(format!("Unknown environment: '{other}'")),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("secret", &"..")
            .finish()
    }
}

/// JSON-over-HTTPS client for the aggregation API. Every call is a POST with
/// the client credentials in headers; error bodies are classified into
/// [`AggregatorError`] before they leave this type.
pub struct AggregatorClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
}

impl AggregatorClient {
    pub fn new(
        environment: Environment,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, AggregatorError> {
        Self::with_base_url(environment.base_url(), credentials, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, AggregatorError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, AggregatorError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {url}");

        let response = self
            .http
            .post(&url)
            .header("PLAID-CLIENT-ID", &self.credentials.client_id)
            .header("PLAID-SECRET", &self.credentials.secret)
            .header("Plaid-Version", API_VERSION)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(AggregatorError::from_response(status.as_u16(), &bytes));
        }

        serde_json::from_slice(&bytes).map_err(|e| AggregatorError::Decode(format!("{path}: {e}")))
    }
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct LinkTokenCreateBody<'a> {
    client_name: &'a str,
    language: &'a str,
    country_codes: &'a [String],
    user: LinkUser<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    products: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
    transactions: LinkTransactions,
}

#[derive(Serialize)]
struct LinkUser<'a> {
    client_user_id: &'a str,
}

#[derive(Serialize)]
struct LinkTransactions {
    days_requested: u32,
}

#[derive(Deserialize)]
struct LinkTokenCreateResponse {
    link_token: LinkToken,
}

#[derive(Serialize)]
struct PublicTokenBody<'a> {
    public_token: &'a str,
}

#[derive(Serialize)]
struct AccessTokenBody<'a> {
    access_token: &'a str,
}

#[derive(Serialize)]
struct TransactionsGetBody<'a> {
    access_token: &'a str,
    start_date: String,
    end_date: String,
    options: TransactionsGetOptions<'a>,
}

#[derive(Serialize)]
struct TransactionsGetOptions<'a> {
    #[serde(skip_serializing_if = "no_accounts")]
    account_ids: &'a [AccountId],
    count: u32,
    offset: u32,
}

fn no_accounts(ids: &&[AccountId]) -> bool {
    ids.is_empty()
}

#[derive(Deserialize)]
struct TransactionsGetResponse {
    transactions: Vec<WireTransaction>,
    total_transactions: usize,
}

#[derive(Deserialize)]
struct WireTransaction {
    transaction_id: RemoteId,
    account_id: AccountId,
    amount: Money,
    name: String,
    #[serde(default)]
    merchant_name: Option<String>,
    #[serde(default)]
    pending: bool,
    date: String,
    #[serde(default)]
    category: Option<Vec<String>>,
    #[serde(default)]
    location: Option<WireLocation>,
}

#[derive(Deserialize)]
struct WireLocation {
    address: Option<String>,
    city: Option<String>,
    region: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
}

impl WireLocation {
    /// Non-empty parts joined with ", "; `None` when the aggregator had no location.
    fn single_line(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.address, &self.city, &self.region, &self.postal_code, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref().map(str::trim).filter(|p| !p.is_empty()))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

impl From<WireTransaction> for TransactionRecord {
    fn from(t: WireTransaction) -> Self {
        let mut category = t.category.unwrap_or_default();
        category.truncate(TransactionRecord::CATEGORY_DEPTH);
        TransactionRecord {
            storage_id: None,
            remote_id: t.transaction_id,
            account_id: t.account_id,
            amount: t.amount,
            name: t.name,
            merchant_name: t.merchant_name.filter(|m| !m.is_empty()),
            pending: t.pending,
            date: t.date,
            category,
            address: t.location.and_then(|l| l.single_line()),
        }
    }
}

#[derive(Deserialize)]
struct AccountsGetResponse {
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct ItemGetResponse {
    item: ItemDetails,
    #[serde(default)]
    status: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Ack {}

// ── API surface ───────────────────────────────────────────────────────────────

#[async_trait]
impl Aggregator for AggregatorClient {
    async fn create_link_token(&self, request: &LinkTokenRequest) -> Result<LinkToken, AggregatorError> {
        let (products, access_token) = match &request.mode {
            LinkMode::Fresh { products } => (Some(products.as_slice()), None),
            LinkMode::Relink { access_token } => (None, Some(access_token.as_str())),
        };
        let body = LinkTokenCreateBody {
            client_name: &request.client_name,
            language: &request.language,
            country_codes: &request.country_codes,
            user: LinkUser {
                client_user_id: &request.user_ref,
            },
            products,
            access_token,
            transactions: LinkTransactions {
                days_requested: request.days_requested,
            },
        };
        let response: LinkTokenCreateResponse = self.post("/link/token/create", &body).await?;
        Ok(response.link_token)
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenPair, AggregatorError> {
        self.post("/item/public_token/exchange", &PublicTokenBody { public_token })
            .await
    }

    async fn transactions_page(
        &self,
        request: &TransactionsRequest,
    ) -> Result<TransactionsPage, AggregatorError> {
        let body = TransactionsGetBody {
            access_token: &request.access_token,
            start_date: request.range.start_str(),
            end_date: request.range.end_str(),
            options: TransactionsGetOptions {
                account_ids: &request.account_ids,
                count: request.count,
                offset: request.offset,
            },
        };
        let response: TransactionsGetResponse = self.post("/transactions/get", &body).await?;
        Ok(TransactionsPage {
            transactions: response.transactions.into_iter().map(Into::into).collect(),
            total: response.total_transactions,
        })
    }

    async fn accounts(&self, access_token: &str) -> Result<Vec<Account>, AggregatorError> {
        let response: AccountsGetResponse =
            self.post("/accounts/get", &AccessTokenBody { access_token }).await?;
        Ok(response.accounts)
    }

    async fn item(&self, access_token: &str) -> Result<ItemDetails, AggregatorError> {
        let response: ItemGetResponse = self.post("/item/get", &AccessTokenBody { access_token }).await?;
        let mut item = response.item;
        item.status = response.status;
        Ok(item)
    }

    async fn remove_item(&self, access_token: &str) -> Result<(), AggregatorError> {
        let _: Ack = self.post("/item/remove", &AccessTokenBody { access_token }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::all_transactions;
    use chrono::NaiveDate;
    use ledgerlink_core::{DateRange, ItemId};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AggregatorClient {
        AggregatorClient::with_base_url(
            server.uri(),
            Credentials {
                client_id: "client-1".to_string(),
                secret: "secret-1".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn link_request(mode: LinkMode) -> LinkTokenRequest {
        LinkTokenRequest {
            client_name: "ledgerlink".to_string(),
            user_ref: "workstation".to_string(),
            country_codes: vec!["US".to_string()],
            language: "en".to_string(),
            days_requested: 365,
            mode,
        }
    }

    fn wire_tx(id: &str) -> serde_json::Value {
        json!({
            "transaction_id": id,
            "account_id": "acc-1",
            "amount": 12.5,
            "name": "Blue Bottle Coffee",
            "merchant_name": "Blue Bottle",
            "pending": true,
            "date": "2024-01-15",
            "category": ["Food and Drink", "Restaurants", "Coffee Shop", "Extra"],
            "location": {"address": "1 Main St", "city": "Oakland", "region": "CA", "postal_code": "94607", "country": null}
        })
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("Production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("sandbox".parse::<Environment>().unwrap(), Environment::Sandbox);
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(Environment::Development.to_string(), "development");
    }

    #[tokio::test]
    async fn fresh_link_token_requests_products_without_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/link/token/create"))
            .and(header("PLAID-CLIENT-ID", "client-1"))
            .and(header("PLAID-SECRET", "secret-1"))
            .and(body_partial_json(json!({
                "products": ["transactions"],
                "user": {"client_user_id": "workstation"},
                "transactions": {"days_requested": 365}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "link_token": "link-sandbox-123",
                "expiration": "2024-01-15T12:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client(&server)
            .create_link_token(&link_request(LinkMode::Fresh {
                products: vec!["transactions".to_string()],
            }))
            .await
            .unwrap();
        assert_eq!(token.as_str(), "link-sandbox-123");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("access_token").is_none());
    }

    #[tokio::test]
    async fn relink_token_carries_access_token_without_products() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/link/token/create"))
            .and(body_partial_json(json!({"access_token": "access-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"link_token": "link-2"})))
            .mount(&server)
            .await;

        let token = client(&server)
            .create_link_token(&link_request(LinkMode::Relink {
                access_token: "access-1".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(token.as_str(), "link-2");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("products").is_none());
    }

    #[tokio::test]
    async fn exchange_returns_token_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/item/public_token/exchange"))
            .and(body_partial_json(json!({"public_token": "public-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-1",
                "item_id": "item-1",
                "request_id": "req"
            })))
            .mount(&server)
            .await;

        let pair = client(&server).exchange_public_token("public-1").await.unwrap();
        assert_eq!(pair.item_id, ItemId::new("item-1"));
        assert_eq!(pair.access_token, "access-1");
    }

    #[tokio::test]
    async fn transactions_page_maps_wire_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions/get"))
            .and(body_partial_json(json!({
                "start_date": "2024-01-01",
                "end_date": "2024-01-31",
                "options": {"count": 100, "offset": 0}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accounts": [],
                "transactions": [wire_tx("tx-1")],
                "total_transactions": 1
            })))
            .mount(&server)
            .await;

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let page = client(&server)
            .transactions_page(&TransactionsRequest::new("access-1", range))
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        let tx = &page.transactions[0];
        assert_eq!(tx.remote_id, RemoteId::new("tx-1"));
        assert_eq!(tx.amount, Money::from_cents(1250));
        assert!(tx.pending);
        assert_eq!(tx.category.len(), TransactionRecord::CATEGORY_DEPTH);
        assert_eq!(tx.address.as_deref(), Some("1 Main St, Oakland, CA, 94607"));
        assert!(tx.storage_id.is_none());
    }

    #[tokio::test]
    async fn login_required_surfaces_as_reauth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions/get"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_type": "ITEM_ERROR",
                "error_code": "ITEM_LOGIN_REQUIRED",
                "error_message": "the login details of this item have changed"
            })))
            .mount(&server)
            .await;

        let range = DateRange::trailing_year(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let err = all_transactions(&client(&server), TransactionsRequest::new("access-1", range))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::ReauthRequired { .. }));
    }

    #[tokio::test]
    async fn item_includes_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/item/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "item": {"item_id": "item-1", "institution_id": "ins_3", "available_products": ["balance"], "billed_products": ["transactions"]},
                "status": {"transactions": {"last_successful_update": "2024-01-15T00:00:00Z"}}
            })))
            .mount(&server)
            .await;

        let item = client(&server).item("access-1").await.unwrap();
        assert_eq!(item.institution_id.as_deref(), Some("ins_3"));
        assert!(item.status.is_some());
    }

    #[tokio::test]
    async fn remove_item_acknowledges() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/item/remove"))
            .and(body_partial_json(json!({"access_token": "access-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": "r"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).remove_item("access-1").await.unwrap();
    }
}
