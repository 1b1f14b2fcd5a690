use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::MarketplaceConfig;
use crate::scanner::Marketplace;
use crate::types::{CatalogItem, CatalogPage, Listing, Reputation, SearchQuery, UserProfileResponse};

/// Longest response body quoted in error messages.
const ERROR_BODY_LIMIT: usize = 300;

/// An HTTP session against the marketplace, primed with its cookies.
///
/// One session per cycle; it is never shared between invocations.
pub struct MarketplaceSession {
    client: reqwest::Client,
    api_base: Url,
    request_timeout: Option<Duration>,
}

impl MarketplaceSession {
    /// Build the client and POST the priming URL to collect session cookies.
    ///
    /// A transport failure here is fatal for the cycle.
    pub async fn connect(config: &MarketplaceConfig) -> Result<Self> {
        let priming_url = Url::parse(&config.priming_url)
            .with_context(|| format!("invalid marketplace.priming_url {}", config.priming_url))?;
        let api_base = Url::parse(&config.api_base)
            .with_context(|| format!("invalid marketplace.api_base {}", config.api_base))?;

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .default_headers(default_headers(config)?)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("failed to build HTTP client")?;

        info!("Priming marketplace session at {priming_url}...");
        let resp = client
            .post(priming_url.clone())
            .timeout(Duration::from_secs(config.prime_timeout_secs))
            .send()
            .await
            .with_context(|| format!("session priming request to {priming_url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("Priming request returned {status}, continuing with any cookies received");
        }
        if jar.cookies(&priming_url).is_none() {
            warn!("No session cookies received from {priming_url}, catalog requests may be rejected");
        } else {
            debug!("Session cookies received");
        }

        Ok(Self {
            client,
            api_base,
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
        })
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.get(url);
        match self.request_timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    /// Run a catalog search and return the undecoded JSON body.
    pub async fn search_raw(&self, query: &SearchQuery) -> Result<Value> {
        let url = api_url(&self.api_base, &["catalog", "items"])?;
        let resp = self
            .get(url)
            .query(&query.to_pairs())
            .send()
            .await
            .context("catalog request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("catalog request returned {status}: {}", truncate(&body));
        }
        resp.json::<Value>()
            .await
            .context("failed to decode catalog response")
    }
}

impl Marketplace for MarketplaceSession {
    async fn search(&self, query: &SearchQuery) -> Result<CatalogPage> {
        let body = self.search_raw(query).await?;
        Ok(parse_catalog_page(&body))
    }

    async fn fetch_reputation(&self, seller: &str) -> Result<Reputation> {
        let url = api_url(&self.api_base, &["users", seller])?;
        let resp = self
            .get(url)
            .query(&[("search_text", seller), ("page", "1")])
            .send()
            .await
            .with_context(|| format!("user profile request for {seller} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("user profile for {seller} returned {status}");
        }
        let profile: UserProfileResponse = resp
            .json()
            .await
            .with_context(|| format!("failed to decode user profile for {seller}"))?;
        Ok(Reputation::from(profile.user))
    }
}

/// Decode the `items` array of a catalog response, dropping malformed items.
pub fn parse_catalog_page(body: &Value) -> CatalogPage {
    let Some(items) = body.get("items").and_then(Value::as_array) else {
        warn!("No 'items' array in catalog response");
        return CatalogPage::default();
    };

    let mut page = CatalogPage::default();
    for (idx, item) in items.iter().enumerate() {
        match CatalogItem::deserialize(item) {
            Ok(item) => page.listings.push(Listing::from(item)),
            Err(e) => {
                let id = item.get("id").map(Value::to_string).unwrap_or_default();
                warn!("Skipping malformed catalog item #{idx} (id {id}): {e}");
                page.malformed += 1;
            }
        }
    }
    page
}

/// Append path segments to the API base, percent-encoding each one.
pub fn api_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("marketplace.api_base {base} cannot take path segments"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn default_headers(config: &MarketplaceConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_str(&config.user_agent).context("invalid marketplace.user_agent")?,
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_str(&config.accept_language)
            .context("invalid marketplace.accept_language")?,
    );
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(headers)
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;
    use serde_json::json;

    fn item(id: Value, seller: &str) -> Value {
        json!({
            "id": id,
            "brand_title": "Arc'teryx",
            "title": "Beta jacket",
            "url": "https://www.vinted.ie/items/1-beta",
            "price": { "amount": "180.0", "currency_code": "EUR" },
            "service_fee": { "amount": "9.70", "currency_code": "EUR" },
            "size_title": "S",
            "status": "New with tags",
            "photo": { "full_size_url": "https://images.example/1.jpg" },
            "user": { "login": seller }
        })
    }

    #[test]
    fn parses_items_in_order() {
        let body = json!({ "items": [item(json!(2), "b"), item(json!("1"), "a")] });
        let page = parse_catalog_page(&body);
        assert_eq!(page.malformed, 0);
        let ids: Vec<&str> = page.listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(page.listings[0].seller, "b");
    }

    #[test]
    fn malformed_items_are_counted_and_dropped() {
        let body = json!({
            "items": [
                item(json!(10), "ok"),
                { "id": 11, "title": "no price or seller" },
                item(json!(12), "ok")
            ]
        });
        let page = parse_catalog_page(&body);
        assert_eq!(page.listings.len(), 2);
        assert_eq!(page.malformed, 1);
    }

    #[test]
    fn missing_items_key_is_empty_page() {
        let page = parse_catalog_page(&json!({ "code": 100, "message": "Session expired" }));
        assert!(page.listings.is_empty());
        assert_eq!(page.malformed, 0);
    }

    #[test]
    fn api_url_appends_encoded_segments() {
        let base = Url::parse("https://www.vinted.ie/api/v2").expect("url");
        let url = api_url(&base, &["users", "jane doe"]).expect("joined");
        assert_eq!(url.as_str(), "https://www.vinted.ie/api/v2/users/jane%20doe");

        let slash = Url::parse("https://www.vinted.ie/api/v2/").expect("url");
        let url = api_url(&slash, &["catalog", "items"]).expect("joined");
        assert_eq!(url.as_str(), "https://www.vinted.ie/api/v2/catalog/items");
    }

    #[test]
    fn api_url_rejects_opaque_base() {
        let base = Url::parse("mailto:someone@example.com").expect("url");
        assert!(api_url(&base, &["users"]).is_err());
    }

    #[test]
    fn default_headers_include_user_agent() {
        let headers = default_headers(&MarketplaceConfig::default()).expect("headers");
        let ua = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .expect("user agent");
        assert!(ua.starts_with("Mozilla/5.0"));
        assert_eq!(headers.get(header::DNT).map(|v| v.as_bytes()), Some(&b"1"[..]));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(ERROR_BODY_LIMIT + 10);
        assert_eq!(truncate(&long).chars().count(), ERROR_BODY_LIMIT);
        assert_eq!(truncate("short"), "short");
    }

    // -------------------------------------------------------------------------
    // HTTP paths against a local stub
    // -------------------------------------------------------------------------

    async fn stub_session(server: &StubServer) -> MarketplaceSession {
        let config = MarketplaceConfig {
            priming_url: server.url("/"),
            api_base: server.url("/api/v2"),
            prime_timeout_secs: 5,
            request_timeout_secs: Some(5),
            ..MarketplaceConfig::default()
        };
        MarketplaceSession::connect(&config).await.expect("primed session")
    }

    #[tokio::test]
    async fn reputation_not_found_is_an_error() {
        let server = StubServer::start(vec![(200, "{}"), (404, r#"{"code":404}"#)]).await;
        let session = stub_session(&server).await;

        let err = session.fetch_reputation("ghost").await.unwrap_err();
        assert!(err.to_string().contains("404"), "{err:#}");

        let requests = server.requests();
        assert!(requests[0].starts_with("POST / "));
        assert!(requests[1].starts_with("GET /api/v2/users/ghost?"));
    }

    #[tokio::test]
    async fn reputation_without_user_is_all_zero() {
        let server = StubServer::start(vec![(200, "{}"), (200, "{}")]).await;
        let session = stub_session(&server).await;

        let rep = session.fetch_reputation("newbie").await.expect("reputation");
        assert_eq!(rep, Reputation::default());
    }

    #[tokio::test]
    async fn reputation_reads_feedback_counts() {
        let profile = r#"{"user":{"positive_feedback_count":12,"negative_feedback_count":1}}"#;
        let server = StubServer::start(vec![(200, "{}"), (200, profile)]).await;
        let session = stub_session(&server).await;

        let rep = session.fetch_reputation("jane doe").await.expect("reputation");
        assert_eq!(rep.positive, 12);
        assert_eq!(rep.neutral, 0);
        assert_eq!(rep.negative, 1);
        assert!(server.requests()[1].starts_with("GET /api/v2/users/jane%20doe?"));
    }

    #[tokio::test]
    async fn search_decodes_stub_catalog() {
        let catalog = json!({ "items": [item(json!(7), "seller"), json!({ "id": 8 })] });
        let body = catalog.to_string();
        let server = StubServer::start(vec![(200, "{}"), (200, body.as_str())]).await;
        let session = stub_session(&server).await;

        let query = SearchQuery::from_pairs([("search_text", "beta")]);
        let page = session.search(&query).await.expect("catalog page");
        assert_eq!(page.listings.len(), 1);
        assert_eq!(page.listings[0].id, "7");
        assert_eq!(page.malformed, 1);
        assert!(server.requests()[1].starts_with("GET /api/v2/catalog/items?search_text=beta "));
    }

    #[tokio::test]
    async fn search_error_status_is_an_error() {
        let server = StubServer::start(vec![(200, "{}"), (500, r#"{"error":"boom"}"#)]).await;
        let session = stub_session(&server).await;

        let query = SearchQuery::from_pairs([("search_text", "beta")]);
        let err = session.search(&query).await.unwrap_err();
        assert!(err.to_string().contains("500"), "{err:#}");
    }
}
