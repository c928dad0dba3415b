//! Fixed-window per-client rate limiting for the UDP path.

use dashmap::DashMap;
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

struct Window {
    started: Instant,
    count: u32,
}

/// Per-client fixed-window counter. A limit of 0 disables the limiter.
pub struct RateLimiter {
    limit: u32,
    whitelist: Vec<IpNetwork>,
    windows: DashMap<IpAddr, Window>,
}

impl RateLimiter {
    pub fn new(limit: u32, whitelist: &[String]) -> Self {
        let whitelist = whitelist
            .iter()
            .filter_map(|entry| {
                entry
                    .parse::<IpNetwork>()
                    .ok()
                    .or_else(|| entry.parse::<IpAddr>().ok().map(IpNetwork::from))
            })
            .collect();
        RateLimiter {
            limit,
            whitelist,
            windows: DashMap::new(),
        }
    }

    /// True when `client` is over its budget and the datagram must be dropped.
    pub fn should_drop(&self, client: IpAddr) -> bool {
        if self.limit == 0 {
            return false;
        }
        if self.whitelist.iter().any(|net| net.contains(client)) {
            return false;
        }

        let now = Instant::now();
        let mut window = self.windows.entry(client).or_insert_with(|| Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;
        window.count > self.limit
    }
}
