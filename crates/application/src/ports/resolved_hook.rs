use super::query_log::QueryRecord;

/// Post-response side-effect hook, fired once per logged request after the
/// query-log write. Fire-and-forget: implementations swallow their own
/// failures and must return quickly.
pub trait ResolvedHook: Send + Sync {
    fn on_resolved(&self, record: &QueryRecord);
}
