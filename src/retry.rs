use std::ops::RangeInclusive;
use std::time::Duration;

use tracing::{debug, warn};

use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::model::Fragment;
use crate::settings::RetrySettings;

/// Bounded attempts with a jittered pause before each one.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay_ms: RangeInclusive<u64>,
    timeout: Duration,
}

/// What a detail fetch ended up as.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub fragment: Fragment,
    pub attempts: u32,
    pub degraded: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: RangeInclusive<u64>, timeout: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay_ms,
            timeout,
        }
    }

    pub fn from_settings(s: &RetrySettings, timeout: Duration) -> Self {
        Self::new(s.max_attempts, s.min_delay_ms..=s.max_delay_ms, timeout)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn jitter(&self) -> Duration {
        let (lo, hi) = (*self.delay_ms.start(), *self.delay_ms.end());
        if hi <= lo {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(fastrand::u64(lo..=hi))
    }

    /// Fetch and extract `url`, retrying misses and transient errors.
    /// Never fails: on exhaustion the result is a degraded fragment.
    pub async fn enrich<F, X>(&self, fetcher: &mut F, extractor: &X, url: &str) -> Enrichment
    where
        F: Fetcher,
        X: Extractor<Output = Fragment>,
    {
        for attempt in 1..=self.max_attempts {
            let pause = self.jitter();
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            match fetcher.fetch(url, self.timeout).await {
                Ok(page) => match extractor.extract(&page) {
                    Some(fragment) => {
                        debug!("Extracted {} on attempt {}", url, attempt);
                        return Enrichment {
                            fragment,
                            attempts: attempt,
                            degraded: false,
                        };
                    }
                    None => warn!(
                        "No detail block on {} (attempt {}/{})",
                        url, attempt, self.max_attempts
                    ),
                },
                Err(e) => warn!("{} (attempt {}/{})", e, attempt, self.max_attempts),
            }
        }

        warn!(
            "Giving up on {} after {} attempts, leaving fields empty",
            url, self.max_attempts
        );
        Enrichment {
            fragment: Fragment::degraded(),
            attempts: self.max_attempts,
            degraded: true,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::PageContent;
    use std::collections::HashMap;

    /// Scripted fetcher: each URL fails a set number of times, then serves
    /// `ok:<url>`. Records every call.
    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        pub failures: HashMap<String, u32>,
        pub calls: Vec<String>,
    }

    impl ScriptedFetcher {
        pub fn failing(url: &str, times: u32) -> Self {
            let mut f = ScriptedFetcher::default();
            f.failures.insert(url.to_string(), times);
            f
        }

        pub fn calls_for(&self, url: &str) -> usize {
            self.calls.iter().filter(|c| *c == url).count()
        }
    }

    impl Fetcher for ScriptedFetcher {
        async fn fetch(&mut self, url: &str, _timeout: Duration) -> Result<PageContent, FetchError> {
            self.calls.push(url.to_string());
            if let Some(left) = self.failures.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FetchError::Timeout(url.to_string()));
                }
            }
            Ok(PageContent {
                url: url.to_string(),
                body: format!("ok:{}", url),
            })
        }

        async fn fetch_bytes(&mut self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
            self.fetch(url, timeout).await.map(|p| p.body.into_bytes())
        }
    }

    /// Extracts `ok:<url>` bodies into a fragment titled with the URL.
    pub(crate) struct EchoExtractor;

    impl Extractor for EchoExtractor {
        type Output = Fragment;

        fn extract(&self, page: &PageContent) -> Option<Fragment> {
            let url = page.body.strip_prefix("ok:")?;
            Some(Fragment {
                title: url.to_string(),
                wear: "Factory New".into(),
                text: format!("about {}", url),
            })
        }
    }

    /// Never finds the expected shape.
    struct MissExtractor;

    impl Extractor for MissExtractor {
        type Output = Fragment;

        fn extract(&self, _page: &PageContent) -> Option<Fragment> {
            None
        }
    }

    pub(crate) fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, 0..=0, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn success_short_circuits() {
        let mut fetcher = ScriptedFetcher::default();
        let out = instant(2).enrich(&mut fetcher, &EchoExtractor, "a").await;
        assert!(!out.degraded);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.fragment.title, "a");
        assert_eq!(fetcher.calls_for("a"), 1);
    }

    #[tokio::test]
    async fn recovers_on_second_attempt() {
        let mut fetcher = ScriptedFetcher::failing("a", 1);
        let out = instant(2).enrich(&mut fetcher, &EchoExtractor, "a").await;
        assert!(!out.degraded);
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn always_failing_uses_exactly_max_attempts() {
        for max in [1, 2, 5] {
            let mut fetcher = ScriptedFetcher::failing("a", u32::MAX);
            let out = instant(max).enrich(&mut fetcher, &EchoExtractor, "a").await;
            assert!(out.degraded);
            assert_eq!(out.fragment, Fragment::degraded());
            assert_eq!(out.attempts, max);
            assert_eq!(fetcher.calls_for("a"), max as usize);
        }
    }

    #[tokio::test]
    async fn extraction_miss_degrades_like_fetch_error() {
        let mut fetcher = ScriptedFetcher::default();
        let out = instant(2).enrich(&mut fetcher, &MissExtractor, "a").await;
        assert!(out.degraded);
        assert_eq!(fetcher.calls_for("a"), 2);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(instant(0).max_attempts(), 1);
    }

    #[test]
    fn jitter_stays_in_range() {
        let p = RetryPolicy::new(2, 100..=200, Duration::from_secs(1));
        for _ in 0..100 {
            let d = p.jitter().as_millis();
            assert!((100..=200).contains(&d));
        }
    }
}
