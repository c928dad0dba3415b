mod filter_engine;
mod hooks;
mod query_log;
mod resolved_hook;
mod stats;
mod upstream;

pub use filter_engine::FilterEngine;
pub use hooks::{FilterSettingsOverlay, OnDnsRequest, ServerHooks, UpstreamsByClient};
pub use query_log::{QueryLogSink, QueryRecord};
pub use resolved_hook::ResolvedHook;
pub use stats::StatsSink;
pub use upstream::{Exchange, UpstreamResolver};
