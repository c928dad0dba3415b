use hickory_proto::rr::RecordType;
use warden_dns_domain::{DomainError, FilterVerdict, RequestFilterSettings};

/// The filter engine collaborator.
///
/// Rule compilation and matching live outside this crate; the pipeline only
/// asks two questions: "may this query go out?" (`check_host`) and "may this
/// answer come back?" (`check_host_rules`, which skips categories such as
/// safe-browsing that only make sense for the queried name itself).
pub trait FilterEngine: Send + Sync {
    /// Engine-wide settings used as the base for each request's snapshot.
    fn default_settings(&self) -> RequestFilterSettings;

    fn check_host(
        &self,
        host: &str,
        qtype: RecordType,
        settings: &RequestFilterSettings,
    ) -> Result<FilterVerdict, DomainError>;

    fn check_host_rules(
        &self,
        host: &str,
        qtype: RecordType,
        settings: &RequestFilterSettings,
    ) -> Result<FilterVerdict, DomainError>;
}
