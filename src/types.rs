use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// ── Search queries ─────────────────────────────────────────────────

/// One value of a search filter as written in `config.toml`.
///
/// Lists expand to repeated keys (`brand_ids[]=53&brand_ids[]=14`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    fn push_pairs(&self, key: &str, out: &mut Vec<(String, String)>) {
        match self {
            ParamValue::Bool(b) => out.push((key.to_string(), b.to_string())),
            ParamValue::Integer(i) => out.push((key.to_string(), i.to_string())),
            ParamValue::Float(f) => out.push((key.to_string(), f.to_string())),
            ParamValue::Text(s) => out.push((key.to_string(), s.clone())),
            ParamValue::List(values) => {
                for value in values {
                    value.push_pairs(key, out);
                }
            }
        }
    }
}

/// A saved catalog search: opaque key/value filters passed to the API verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchQuery(pub BTreeMap<String, ParamValue>);

impl SearchQuery {
    /// Build a query from plain string pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), ParamValue::Text(v.into())))
                .collect(),
        )
    }

    /// Flatten into query-string pairs, keys in sorted order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            value.push_pairs(key, &mut out);
        }
        out
    }

    /// Short human-readable description for logs.
    pub fn label(&self) -> String {
        if let Some(ParamValue::Text(text)) = self.0.get("search_text") {
            return format!("\"{text}\"");
        }
        let pairs: Vec<String> = self
            .to_pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if pairs.is_empty() {
            "(no filters)".to_string()
        } else {
            pairs.join("&")
        }
    }
}

// ── Marketplace wire shapes ────────────────────────────────────────

/// The catalog returns ids as integers, but strings show up too.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Str(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(i) => i.to_string(),
        RawId::Str(s) => s,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    #[serde(default)]
    pub currency_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Photo {
    pub full_size_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogUser {
    pub login: String,
}

/// One element of the catalog `items` array.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItem {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub brand_title: Option<String>,
    pub title: String,
    pub url: String,
    pub price: Money,
    pub service_fee: Option<Money>,
    pub size_title: Option<String>,
    pub status: Option<String>,
    pub photo: Option<Photo>,
    pub user: CatalogUser,
}

/// Feedback counters inside the user-profile response. Missing counters are zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFeedback {
    #[serde(default)]
    pub positive_feedback_count: u64,
    #[serde(default)]
    pub neutral_feedback_count: u64,
    #[serde(default)]
    pub negative_feedback_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfileResponse {
    #[serde(default)]
    pub user: UserFeedback,
}

// ── Domain types ───────────────────────────────────────────────────

/// A marketplace listing returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub id: String,
    pub brand_title: String,
    pub title: String,
    pub url: String,
    pub price: Decimal,
    pub currency: String,
    pub service_fee: Option<Decimal>,
    pub size: Option<String>,
    pub condition: Option<String>,
    pub image_url: Option<String>,
    pub seller: String,
}

impl Listing {
    /// Brand title when present, the listing name otherwise.
    pub fn headline(&self) -> &str {
        if self.brand_title.trim().is_empty() {
            &self.title
        } else {
            &self.brand_title
        }
    }

    /// Price with currency, e.g. `12.50 EUR`.
    pub fn price_label(&self) -> String {
        if self.currency.is_empty() {
            self.price.to_string()
        } else {
            format!("{} {}", self.price, self.currency)
        }
    }
}

impl From<CatalogItem> for Listing {
    fn from(item: CatalogItem) -> Self {
        Self {
            id: item.id,
            brand_title: item.brand_title.unwrap_or_default(),
            title: item.title,
            url: item.url,
            price: item.price.amount,
            currency: item.price.currency_code,
            service_fee: item.service_fee.map(|fee| fee.amount),
            size: item.size_title.filter(|s| !s.is_empty()),
            condition: item.status.filter(|s| !s.is_empty()),
            image_url: item.photo.and_then(|p| p.full_size_url),
            seller: item.user.login,
        }
    }
}

/// Aggregate feedback counters for one seller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Reputation {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl From<UserFeedback> for Reputation {
    fn from(feedback: UserFeedback) -> Self {
        Self {
            positive: feedback.positive_feedback_count,
            neutral: feedback.neutral_feedback_count,
            negative: feedback.negative_feedback_count,
        }
    }
}

/// Listings decoded from one catalog response.
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub listings: Vec<Listing>,
    /// Items that could not be decoded and were dropped.
    pub malformed: u64,
}

/// Counters for one scan cycle, emitted as JSON when the cycle ends.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub queries_run: u64,
    pub queries_failed: u64,
    pub listings_examined: u64,
    pub already_seen: u64,
    pub malformed: u64,
    pub reputation_failures: u64,
    pub low_reputation: u64,
    pub delivered: u64,
    pub dispatch_failures: u64,
    pub would_notify: u64,
    pub store_errors: u64,
    /// Ids newly written to the seen-item store.
    pub processed: u64,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            queries_run: 0,
            queries_failed: 0,
            listings_examined: 0,
            already_seen: 0,
            malformed: 0,
            reputation_failures: 0,
            low_reputation: 0,
            delivered: 0,
            dispatch_failures: 0,
            would_notify: 0,
            store_errors: 0,
            processed: 0,
        }
    }
}
