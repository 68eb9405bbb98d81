use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::fmt::round_cents;
use crate::models::Candidate;

/// The feed refuses change windows longer than this.
pub const MAX_LOOKBACK_DAYS: i64 = 90;

pub const FEED_TAG_PREFIX: &str = "feed:";

pub fn correlation_tag(feed_item_uid: &str) -> String {
    format!("{FEED_TAG_PREFIX}{feed_item_uid}")
}

/// Start of the change window, capped at the feed's limit.
pub fn lookback_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days.clamp(1, MAX_LOOKBACK_DAYS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedAmount {
    #[serde(default)]
    pub currency: String,
    pub minor_units: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub feed_item_uid: String,
    pub transaction_time: DateTime<FixedOffset>,
    pub amount: FeedAmount,
    pub direction: Direction,
    #[serde(default)]
    pub counter_party_name: Option<String>,
    #[serde(default)]
    pub counter_party_sub_entity_name: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    pub status: String,
}

impl FeedItem {
    pub fn signed_amount(&self) -> f64 {
        let value = round_cents(self.amount.minor_units.unsigned_abs() as f64 / 100.0);
        match self.direction {
            Direction::In => value,
            Direction::Out => -value,
        }
    }

    pub fn correlation_tag(&self) -> String {
        correlation_tag(&self.feed_item_uid)
    }

    pub fn to_candidate(&self) -> Candidate {
        let reference = self
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let description = self
            .counter_party_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| reference.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        Candidate {
            date: self.transaction_time.date_naive(),
            description,
            merchant: self
                .counter_party_sub_entity_name
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            reference,
            amount: self.signed_amount(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedResponse {
    #[serde(default)]
    feed_items: Vec<FeedItem>,
}

/// Anything that can list the recent feed items of an account.
pub trait FeedSource {
    fn fetch_changes(&self, account_uid: &str, since: DateTime<Utc>) -> Result<Vec<FeedItem>>;
}

/// Blocking client for `GET {api_base}/accounts/{uid}/feed?changesSince=`.
pub struct FeedClient {
    http: reqwest::blocking::Client,
    api_base: String,
    token: String,
}

impl FeedClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("tally/{}", env!("CARGO_PKG_VERSION")))
            .timeout(StdDuration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

impl FeedSource for FeedClient {
    fn fetch_changes(&self, account_uid: &str, since: DateTime<Utc>) -> Result<Vec<FeedItem>> {
        let url = format!("{}/accounts/{}/feed", self.api_base, account_uid);
        let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("changesSince", since.as_str())])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TallyError::Feed {
                status: status.as_u16(),
                body,
            });
        }

        let body: FeedResponse = response.json()?;
        debug!(account_uid, items = body.feed_items.len(), "Fetched feed items");
        Ok(body.feed_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use httpmock::prelude::*;
    use serde_json::json;

    fn item_json(uid: &str, time: &str, minor: i64, direction: &str, name: &str, status: &str) -> serde_json::Value {
        json!({
            "feedItemUid": uid,
            "transactionTime": time,
            "amount": { "currency": "GBP", "minorUnits": minor },
            "direction": direction,
            "counterPartyName": name,
            "status": status,
        })
    }

    #[test]
    fn test_item_to_candidate() {
        let item: FeedItem = serde_json::from_value(item_json(
            "u1", "2024-04-06T23:15:00.000Z", 4250, "OUT", " Tesco ", "SETTLED",
        ))
        .unwrap();
        let c = item.to_candidate();
        assert_eq!(c.date, NaiveDate::from_ymd_opt(2024, 4, 6).unwrap());
        assert_eq!(c.amount, -42.5);
        assert_eq!(c.description, "Tesco");
        assert_eq!(c.reference, None);
        assert_eq!(item.correlation_tag(), "feed:u1");
    }

    #[test]
    fn test_inbound_amount_is_positive() {
        let mut value = item_json("u2", "2024-04-06T09:00:00Z", 120000, "IN", "Client Ltd", "SETTLED");
        value["reference"] = json!("INV-7");
        let item: FeedItem = serde_json::from_value(value).unwrap();
        let c = item.to_candidate();
        assert_eq!(c.amount, 1200.0);
        assert_eq!(c.reference.as_deref(), Some("INV-7"));
    }

    #[test]
    fn test_extreme_minor_units_do_not_panic() {
        let item: FeedItem = serde_json::from_value(item_json(
            "u4", "2024-04-06T09:00:00Z", i64::MIN, "OUT", "Glitch", "SETTLED",
        ))
        .unwrap();
        let amount = item.signed_amount();
        assert!(amount.is_finite());
        assert!(amount < 0.0);
    }

    #[test]
    fn test_zero_outbound_amount_is_plain_zero() {
        let item: FeedItem = serde_json::from_value(item_json(
            "u5", "2024-04-06T09:00:00Z", 0, "OUT", "Card check", "SETTLED",
        ))
        .unwrap();
        assert!(item.signed_amount().is_sign_positive());
    }

    #[test]
    fn test_missing_counterparty_falls_back_to_reference() {
        let mut value = item_json("u3", "2024-04-06T09:00:00Z", 100, "OUT", "", "PENDING");
        value["reference"] = json!("CARD 1234");
        let item: FeedItem = serde_json::from_value(value).unwrap();
        assert_eq!(item.to_candidate().description, "CARD 1234");
    }

    #[test]
    fn test_lookback_is_capped() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(lookback_start(now, 7), now - Duration::days(7));
        assert_eq!(lookback_start(now, 400), now - Duration::days(MAX_LOOKBACK_DAYS));
        assert_eq!(lookback_start(now, 0), now - Duration::days(1));
    }

    #[test]
    fn test_fetch_changes() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/accounts/acc-1/feed")
                .query_param("changesSince", "2024-04-01T00:00:00.000Z")
                .header("authorization", "Bearer secret");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "feedItems": [
                        item_json("u1", "2024-04-06T10:00:00.000Z", 4250, "OUT", "Tesco", "SETTLED"),
                        item_json("u2", "2024-04-07T10:00:00.000Z", 999, "OUT", "Netflix", "PENDING"),
                    ]
                }));
        });

        let client = FeedClient::new(&server.base_url(), "secret").unwrap();
        let since = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let items = client.fetch_changes("acc-1", since).unwrap();

        mock.assert();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].feed_item_uid, "u1");
        assert_eq!(items[1].status, "PENDING");
    }

    #[test]
    fn test_fetch_changes_http_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/accounts/acc-1/feed");
            then.status(401).body("invalid token");
        });

        let client = FeedClient::new(&server.base_url(), "bad").unwrap();
        let err = client.fetch_changes("acc-1", Utc::now()).unwrap_err();
        match err {
            TallyError::Feed { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("expected feed error, got {other}"),
        }
    }
}
