use crate::domain::{FeedAReport, FeedBReport, RemoteSignals};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default TTL for cached feed responses.
const CACHE_TTL_SECONDS: u64 = 30 * 60;

#[derive(Debug, Clone)]
struct CachedSignals {
    signals: RemoteSignals,
    cached_at: Instant,
}

#[derive(Debug, Clone)]
pub struct FeedEndpoints {
    /// URL reputation feed; queried as `{url}?domain=<domain>`.
    pub feed_a: String,
    /// Malware host feed; queried the same way.
    pub feed_b: String,
}

/// Looks up a domain in two remote reputation feeds. All failures (network
/// errors, timeouts, bad payloads) degrade to an absent signal for that
/// feed; the engine treats absence as a zero contribution.
#[derive(Debug, Clone)]
pub struct ThreatFeedClient {
    client: reqwest::Client,
    endpoints: FeedEndpoints,
    cache: Arc<RwLock<HashMap<String, CachedSignals>>>,
    cache_ttl: Duration,
    timeout: Duration,
    use_mock: bool,
}

impl ThreatFeedClient {
    pub fn new(endpoints: FeedEndpoints, timeout_seconds: u64, use_mock: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl: Duration::from_secs(CACHE_TTL_SECONDS),
            timeout: Duration::from_secs(timeout_seconds),
            use_mock,
        }
    }

    /// Fetch signals for a domain, serving from the TTL cache when fresh.
    /// Returns None only when neither feed produced a usable answer.
    pub async fn lookup(&self, domain: &str) -> Option<RemoteSignals> {
        let domain = domain.to_lowercase();

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&domain) {
                if cached.cached_at.elapsed() < self.cache_ttl {
                    log::debug!("Using cached feed signals for {domain}");
                    return Some(cached.signals.clone());
                }
            }
        }

        let signals = if self.use_mock {
            mock_signals(&domain)
        } else {
            self.fetch(&domain).await
        };

        if signals.feed_a.is_none() && signals.feed_b.is_none() {
            log::debug!("No usable feed signals for {domain}");
            return None;
        }

        let mut cache = self.cache.write().await;
        cache.insert(
            domain,
            CachedSignals {
                signals: signals.clone(),
                cached_at: Instant::now(),
            },
        );

        Some(signals)
    }

    async fn fetch(&self, domain: &str) -> RemoteSignals {
        let feed_a = self
            .query::<FeedAReport>(&self.endpoints.feed_a, domain)
            .await;
        let feed_b = self
            .query::<FeedBReport>(&self.endpoints.feed_b, domain)
            .await;
        RemoteSignals { feed_a, feed_b }
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        domain: &str,
    ) -> Option<T> {
        let request = self
            .client
            .get(endpoint)
            .query(&[("domain", domain)])
            .send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                log::warn!("Feed request to {endpoint} failed for {domain}: {e}");
                return None;
            }
            Err(_) => {
                log::warn!("Feed request to {endpoint} timed out for {domain}");
                return None;
            }
        };

        if !response.status().is_success() {
            log::warn!(
                "Feed {endpoint} returned {} for {domain}",
                response.status()
            );
            return None;
        }

        match response.json::<T>().await {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("Feed {endpoint} returned unparseable payload for {domain}: {e}");
                None
            }
        }
    }
}

/// Deterministic signals for tests and offline runs.
fn mock_signals(domain: &str) -> RemoteSignals {
    let flagged = domain.contains("malware") || domain.contains("phish");
    RemoteSignals {
        feed_a: Some(FeedAReport {
            malicious_count: if flagged { 3 } else { 0 },
        }),
        feed_b: Some(FeedBReport {
            match_count: if domain.contains("malware") { 1 } else { 0 },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_client() -> ThreatFeedClient {
        ThreatFeedClient::new(
            FeedEndpoints {
                feed_a: "http://127.0.0.1:1/feed-a".to_string(),
                feed_b: "http://127.0.0.1:1/feed-b".to_string(),
            },
            1,
            true,
        )
    }

    #[tokio::test]
    async fn test_mock_flags_malware_domains() {
        let client = mock_client();
        let signals = client.lookup("malware-download.example").await.unwrap();
        assert_eq!(signals.feed_a.unwrap().malicious_count, 3);
        assert_eq!(signals.feed_b.unwrap().match_count, 1);
    }

    #[tokio::test]
    async fn test_mock_clean_domain_zero_counts() {
        let client = mock_client();
        let signals = client.lookup("ordinary.example").await.unwrap();
        assert_eq!(signals.feed_a.unwrap().malicious_count, 0);
        assert_eq!(signals.feed_b.unwrap().match_count, 0);
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_lookups() {
        let client = mock_client();
        let first = client.lookup("phish-site.example").await.unwrap();
        let second = client.lookup("phish-site.example").await.unwrap();
        assert_eq!(
            first.feed_a.unwrap().malicious_count,
            second.feed_a.unwrap().malicious_count
        );
        assert_eq!(client.cache.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_feeds_yield_none() {
        // Real (non-mock) client pointed at a closed port: both feeds fail
        // and the lookup degrades to None rather than an error.
        let client = ThreatFeedClient::new(
            FeedEndpoints {
                feed_a: "http://127.0.0.1:1/feed-a".to_string(),
                feed_b: "http://127.0.0.1:1/feed-b".to_string(),
            },
            1,
            false,
        );
        assert!(client.lookup("whatever.example").await.is_none());
    }
}
