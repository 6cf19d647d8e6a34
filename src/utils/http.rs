//! HTTP client shared by the citation services.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent sent with every request, with a contact address when one is configured.
///
/// Crossref and OpenAlex route clients that identify themselves this way to
/// their "polite" pools.
pub fn user_agent(mailto: Option<&str>) -> String {
    let base = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
    match mailto.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mailto) => format!("{} (mailto:{})", base, mailto),
        None => base.to_string(),
    }
}

/// Cheaply clonable reqwest client
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Client with a per-request timeout and no contact address
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_mailto(timeout, None)
    }

    pub fn with_mailto(timeout: Duration, mailto: Option<&str>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent(mailto))
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
