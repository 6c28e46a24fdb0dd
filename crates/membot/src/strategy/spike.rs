//! Trade-flow spike detection on a single mint.
//!
//! Each log notification mentioning the mint counts as one trade event.
//! Two detectors decide when flow qualifies as a spike:
//! - `PopDetector`: a chain of events with gaps inside `[gap_min, gap_max]`
//! - `BucketDetector`: fixed-length buckets, each with at least one event
//!
//! The detectors are clock-driven state machines; the async drivers below
//! feed them from a `MintLogStream`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use membot_chain::MintLogStream;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::SpikeConfig;

/// Trade-flow signals for one mint.
#[async_trait]
pub trait TradeFlow: Send + Sync {
    /// True when the mint shows a qualifying spike.
    async fn detect_spike(&self, mint: &str) -> bool;

    /// True when at least one trade event arrives within `timeout`.
    async fn wait_for_next_pop(&self, mint: &str, timeout: Duration) -> bool;
}

/// `TradeFlow` over per-mint WebSocket log subscriptions.
#[derive(Debug, Clone)]
pub struct LogFlow {
    ws_url: String,
    config: SpikeConfig,
}

impl LogFlow {
    pub fn new(ws_url: impl Into<String>, config: SpikeConfig) -> Self {
        Self {
            ws_url: ws_url.into(),
            config,
        }
    }
}

#[async_trait]
impl TradeFlow for LogFlow {
    async fn detect_spike(&self, mint: &str) -> bool {
        detect_spike(&self.ws_url, mint, &self.config).await
    }

    async fn wait_for_next_pop(&self, mint: &str, timeout: Duration) -> bool {
        wait_for_next_pop(&self.ws_url, mint, timeout).await
    }
}

/// Connect timeout for per-mint streams.
pub const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const MIN_WAIT: Duration = Duration::from_millis(50);
const MAX_BUCKET_POLL: Duration = Duration::from_millis(500);

/// Events needed for the cumulative early trigger.
const CUM_MIN_EVENTS: u32 = 3;

/// Counts consecutive pops whose spacing stays inside the gap bounds.
#[derive(Debug, Clone)]
pub struct PopDetector {
    required: u32,
    gap_min: Duration,
    gap_max: Duration,
    pops: u32,
    last: Option<Instant>,
}

impl PopDetector {
    pub fn new(config: &SpikeConfig) -> Self {
        Self {
            required: config.required.max(1),
            gap_min: config.gap_min,
            gap_max: config.gap_max,
            pops: 0,
            last: None,
        }
    }

    /// Register an event at `now`; true once the chain is long enough.
    pub fn on_event(&mut self, now: Instant) -> bool {
        let in_range = match self.last {
            None => true,
            Some(last) => {
                let gap = now.saturating_duration_since(last);
                gap >= self.gap_min && gap <= self.gap_max
            }
        };
        self.last = Some(now);

        if in_range {
            self.pops += 1;
            self.pops >= self.required
        } else {
            // Gap too small or too large: restart the chain here
            self.pops = 1;
            false
        }
    }

    pub fn pops(&self) -> u32 {
        self.pops
    }
}

/// Counts fixed-length buckets containing at least one event.
#[derive(Debug, Clone)]
pub struct BucketDetector {
    bucket_len: Duration,
    required: u32,
    cum_window: Duration,
    cum_enabled: bool,
    start: Instant,
    bucket_start: Instant,
    bucket_events: u32,
    qualified: u32,
    events: u32,
}

impl BucketDetector {
    pub fn new(config: &SpikeConfig, start: Instant) -> Self {
        Self {
            bucket_len: Duration::from_secs(config.bucket_secs.max(1)),
            required: config.required.max(1),
            cum_window: config.cum_window,
            cum_enabled: config.cum_min_usd > Decimal::ZERO,
            start,
            bucket_start: start,
            bucket_events: 0,
            qualified: 0,
            events: 0,
        }
    }

    /// Close the current bucket if its time is up; true on trigger.
    pub fn roll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.bucket_start) < self.bucket_len {
            return false;
        }
        let triggered = self.close_bucket();
        self.bucket_start = now;
        triggered
    }

    /// Register an event at `now`; true on the cumulative early trigger.
    pub fn on_event(&mut self, now: Instant) -> bool {
        self.bucket_events += 1;
        self.events += 1;

        !self.cum_window.is_zero()
            && self.cum_enabled
            && now.saturating_duration_since(self.start) <= self.cum_window
            && self.events >= CUM_MIN_EVENTS
    }

    /// Count the partial bucket at the end of the window.
    pub fn finish(&mut self) -> bool {
        self.close_bucket()
    }

    pub fn qualified(&self) -> u32 {
        self.qualified
    }

    /// Poll interval that keeps buckets rolling on time.
    pub fn poll_interval(&self) -> Duration {
        (self.bucket_len / 4).clamp(MIN_WAIT, MAX_BUCKET_POLL)
    }

    fn close_bucket(&mut self) -> bool {
        let had_events = self.bucket_events > 0;
        self.bucket_events = 0;
        if had_events {
            self.qualified += 1;
            return self.qualified >= self.required;
        }
        false
    }
}

/// Watch `mint` for up to the configured window; true on a spike.
///
/// Connection failures count as no spike.
pub async fn detect_spike(ws_url: &str, mint: &str, config: &SpikeConfig) -> bool {
    let mut stream = match MintLogStream::open(ws_url, mint, STREAM_CONNECT_TIMEOUT).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Spike monitor error for {mint}: {e}");
            return false;
        }
    };

    let detected = if config.use_buckets {
        detect_by_buckets(&mut stream, config).await
    } else {
        detect_by_pops(&mut stream, config).await
    };
    stream.close().await;
    detected
}

async fn detect_by_pops(stream: &mut MintLogStream, config: &SpikeConfig) -> bool {
    let mut detector = PopDetector::new(config);
    let deadline = Instant::now() + config.window;

    while Instant::now() <= deadline {
        let remaining = deadline.saturating_duration_since(Instant::now()).max(MIN_WAIT);
        match stream.next_event(remaining).await {
            Ok(Some(_)) => {
                let triggered = detector.on_event(Instant::now());
                debug!("Pop {}/{} for {}", detector.pops(), config.required, stream.mint());
                if triggered {
                    info!("Spike detected on {} ({} pops)", stream.mint(), detector.pops());
                    return true;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Spike stream for {} ended: {e}", stream.mint());
                return false;
            }
        }
    }
    false
}

async fn detect_by_buckets(stream: &mut MintLogStream, config: &SpikeConfig) -> bool {
    let start = Instant::now();
    let mut detector = BucketDetector::new(config, start);
    let poll = detector.poll_interval();

    while start.elapsed() <= config.window {
        if detector.roll(Instant::now()) {
            info!("Spike detected on {} ({} buckets)", stream.mint(), detector.qualified());
            return true;
        }

        match stream.next_event(poll).await {
            Ok(Some(_)) => {
                if detector.on_event(Instant::now()) {
                    info!("Cumulative early trigger for {}", stream.mint());
                    return true;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Spike stream for {} ended: {e}", stream.mint());
                return false;
            }
        }
    }

    detector.finish()
}

/// Wait for a single trade event on `mint`, up to `timeout`.
pub async fn wait_for_next_pop(ws_url: &str, mint: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout.max(Duration::from_millis(100));
    let mut stream = match MintLogStream::open(ws_url, mint, STREAM_CONNECT_TIMEOUT).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Next-pop wait error for {mint}: {e}");
            return false;
        }
    };

    let mut seen = false;
    while Instant::now() < deadline {
        let wait = deadline
            .saturating_duration_since(Instant::now())
            .min(MAX_BUCKET_POLL);
        match stream.next_event(wait).await {
            Ok(Some(_)) => {
                seen = true;
                break;
            }
            Ok(None) => {}
            Err(e) => {
                debug!("Next-pop stream for {mint} ended: {e}");
                break;
            }
        }
    }
    stream.close().await;
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> SpikeConfig {
        SpikeConfig::default()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_pops_chain_triggers() {
        let t0 = Instant::now();
        let mut d = PopDetector::new(&config());
        assert!(!d.on_event(t0));
        assert!(!d.on_event(t0 + ms(1000)));
        assert!(!d.on_event(t0 + ms(2500)));
        assert!(d.on_event(t0 + ms(4000)));
    }

    #[test]
    fn test_pops_reset_on_bad_gap() {
        let t0 = Instant::now();
        let mut d = PopDetector::new(&config());
        d.on_event(t0);
        d.on_event(t0 + ms(1000));
        // Too fast
        assert!(!d.on_event(t0 + ms(1100)));
        assert_eq!(d.pops(), 1);
        // Too slow
        assert!(!d.on_event(t0 + ms(8000)));
        assert_eq!(d.pops(), 1);
        d.on_event(t0 + ms(9000));
        d.on_event(t0 + ms(10000));
        assert!(d.on_event(t0 + ms(11000)));
    }

    #[test]
    fn test_pops_required_zero_means_one() {
        let mut cfg = config();
        cfg.required = 0;
        let mut d = PopDetector::new(&cfg);
        assert!(d.on_event(Instant::now()));
    }

    #[test]
    fn test_buckets_qualify() {
        let mut cfg = config();
        cfg.cum_window = Duration::ZERO;
        cfg.required = 2;
        let t0 = Instant::now();
        let mut d = BucketDetector::new(&cfg, t0);

        d.on_event(t0 + ms(100));
        assert!(!d.roll(t0 + ms(1000)));
        assert!(!d.roll(t0 + ms(2000)));
        assert_eq!(d.qualified(), 1);

        // Empty bucket does not qualify
        assert!(!d.roll(t0 + ms(4000)));
        assert_eq!(d.qualified(), 1);

        d.on_event(t0 + ms(4500));
        assert!(d.roll(t0 + ms(6000)));
    }

    #[test]
    fn test_buckets_finish_counts_partial() {
        let mut cfg = config();
        cfg.cum_window = Duration::ZERO;
        cfg.required = 1;
        let t0 = Instant::now();
        let mut d = BucketDetector::new(&cfg, t0);
        assert!(!d.finish());
        d.on_event(t0 + ms(10));
        assert!(d.finish());
    }

    #[test]
    fn test_cumulative_early_trigger() {
        let t0 = Instant::now();
        let mut d = BucketDetector::new(&config(), t0);
        assert!(!d.on_event(t0 + ms(100)));
        assert!(!d.on_event(t0 + ms(200)));
        assert!(d.on_event(t0 + ms(300)));
    }

    #[test]
    fn test_cumulative_requires_window_and_usd() {
        let t0 = Instant::now();
        let mut late = BucketDetector::new(&config(), t0);
        late.on_event(t0 + ms(13000));
        late.on_event(t0 + ms(13100));
        assert!(!late.on_event(t0 + ms(13200)));

        let mut cfg = config();
        cfg.cum_min_usd = dec!(0);
        let mut off = BucketDetector::new(&cfg, t0);
        off.on_event(t0);
        off.on_event(t0);
        assert!(!off.on_event(t0));
    }

    #[test]
    fn test_poll_interval_bounds() {
        let t0 = Instant::now();
        assert_eq!(BucketDetector::new(&config(), t0).poll_interval(), ms(500));
        let mut cfg = config();
        cfg.bucket_secs = 1;
        assert_eq!(BucketDetector::new(&cfg, t0).poll_interval(), ms(250));
    }
}
