use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::debounce::ReloadNotify;

/// Tells the wrapper daemon to reload its configuration. Fire-and-forget:
/// the wrapper acknowledges acceptance, not completion, and failures are
/// only logged.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str) -> Self {
        HttpNotifier {
            client: reqwest::Client::new(),
            endpoint: format!("{}/update", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ReloadNotify for HttpNotifier {
    async fn notify(&self) {
        let request = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_secs(5));
        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("asked {} to reload the daemon config", self.endpoint);
            }
            Ok(resp) => {
                warn!(
                    "reload trigger to {} rejected: {}",
                    self.endpoint,
                    resp.status()
                );
            }
            Err(e) => {
                warn!("reload trigger to {} failed: {e}", self.endpoint);
            }
        }
    }
}
