//! DirectAdmin API HTTP client
//!
//! Fetches email logs from the DirectAdmin `/api/email-logs` endpoint.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use base64::prelude::*;
use std::time::Duration;
use url::Url;

use super::api::EmailLogResponse;
use super::{LogQuery, LogSource};
use crate::models::format_timestamp;

/// Login credentials for the DirectAdmin API
#[derive(Debug, Clone)]
pub struct DirectAdminCredentials {
    pub username: String,
    /// Login key created in DirectAdmin, used in place of the password
    pub login_token: String,
}

impl DirectAdminCredentials {
    fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.login_token);
        format!("Basic {}", BASE64_STANDARD.encode(raw))
    }
}

/// DirectAdmin API client for fetching email logs
pub struct DirectAdminClient {
    agent: ureq::Agent,
    base_url: Url,
    credentials: DirectAdminCredentials,
    user_agent: String,
}

impl DirectAdminClient {
    /// Email logs endpoint, relative to the base URL
    const EMAIL_LOGS_PATH: &'static str = "/api/email-logs";

    /// Product token sent in the User-Agent header
    const USER_AGENT_PRODUCT: &'static str = "DirectAdminEmailLogsIngester";

    /// Create a new DirectAdmin client
    ///
    /// # Arguments
    /// * `base_url` - DirectAdmin panel URL, e.g. `https://panel.example.com:2222`
    /// * `credentials` - Username and login token
    /// * `contact` - Operator contact appended to the User-Agent
    /// * `timeout` - Overall timeout for a single request
    pub fn new(
        base_url: Url,
        credentials: DirectAdminCredentials,
        contact: &str,
        timeout: Duration,
    ) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        let user_agent = if contact.is_empty() {
            Self::USER_AGENT_PRODUCT.to_string()
        } else {
            format!("{} {}", Self::USER_AGENT_PRODUCT, contact)
        };

        Self {
            agent,
            base_url,
            credentials,
            user_agent,
        }
    }

    /// Build the full request URL for a query
    pub fn logs_url(&self, query: &LogQuery) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}", base, Self::EMAIL_LOGS_PATH))
            .context("Failed to build email logs URL")?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("from", &format_timestamp(query.from));
            if let Some(to) = query.to {
                pairs.append_pair("to", &format_timestamp(to));
            }
            if let Some(address) = &query.address {
                pairs.append_pair("address", address);
            }
            if let Some(domain) = &query.domain {
                pairs.append_pair("domain", domain);
            }
            if let Some(state) = &query.state {
                pairs.append_pair("state", state.as_str());
            }
            if let Some(direction) = query.direction {
                pairs.append_pair("type", direction.as_str());
            }
        }

        Ok(url)
    }
}

impl LogSource for DirectAdminClient {
    fn fetch_logs(&self, query: &LogQuery) -> Result<EmailLogResponse> {
        let url = self.logs_url(query)?;

        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &self.credentials.basic_auth_header())
            .header("User-Agent", &self.user_agent)
            .call()
            .context("Failed to send email logs request")?;

        let logs: EmailLogResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse email logs response")?;

        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryState, Direction};
    use chrono::{TimeZone, Utc};

    fn make_client(base: &str) -> DirectAdminClient {
        DirectAdminClient::new(
            Url::parse(base).unwrap(),
            DirectAdminCredentials {
                username: "admin".to_string(),
                login_token: "secret".to_string(),
            },
            "ops@example.com",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_basic_auth_header() {
        let creds = DirectAdminCredentials {
            username: "admin".to_string(),
            login_token: "secret".to_string(),
        };
        // base64("admin:secret")
        assert_eq!(creds.basic_auth_header(), "Basic YWRtaW46c2VjcmV0");
    }

    #[test]
    fn test_logs_url_window() {
        let client = make_client("https://panel.example.com:2222/");
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();

        let url = client.logs_url(&LogQuery::window(from, to)).unwrap();
        assert_eq!(url.path(), "/api/email-logs");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("from".to_string(), "2024-01-01T00:00:00.000Z".to_string()),
                ("to".to_string(), "2024-01-01T06:00:00.000Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_logs_url_filters() {
        let client = make_client("https://panel.example.com:2222");
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let query = LogQuery {
            from,
            to: None,
            address: Some("user+tag@example.com".to_string()),
            domain: Some("example.com".to_string()),
            state: Some(DeliveryState::Deferred),
            direction: Some(Direction::Out),
        };

        let url = client.logs_url(&query).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.iter().all(|(k, _)| k != "to"));
        assert!(pairs.contains(&("address".to_string(), "user+tag@example.com".to_string())));
        assert!(pairs.contains(&("domain".to_string(), "example.com".to_string())));
        assert!(pairs.contains(&("state".to_string(), "deferred".to_string())));
        assert!(pairs.contains(&("type".to_string(), "out".to_string())));
    }

    #[test]
    fn test_user_agent_includes_contact() {
        let client = make_client("https://panel.example.com");
        assert_eq!(
            client.user_agent,
            "DirectAdminEmailLogsIngester ops@example.com"
        );
    }
}
