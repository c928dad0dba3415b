use crate::filtering::FilterReason;
use std::net::IpAddr;
use std::sync::Arc;

/// Bucket a finished request falls into for the statistics collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    NotFiltered,
    Filtered,
    SafeBrowsing,
    SafeSearch,
    Parental,
}

impl From<FilterReason> for ResultClass {
    fn from(reason: FilterReason) -> Self {
        match reason {
            FilterReason::FilteredSafeBrowsing => ResultClass::SafeBrowsing,
            FilterReason::FilteredParental => ResultClass::Parental,
            FilterReason::FilteredSafeSearch => ResultClass::SafeSearch,
            FilterReason::FilteredBlockList
            | FilterReason::FilteredInvalid
            | FilterReason::FilteredBlockedService => ResultClass::Filtered,
            _ => ResultClass::NotFiltered,
        }
    }
}

/// One per-request statistics sample.
#[derive(Debug, Clone)]
pub struct StatsEntry {
    /// Queried name, lowercased, trailing dot stripped.
    pub domain: Arc<str>,
    pub client: Option<IpAddr>,
    pub elapsed_ms: u32,
    pub result: ResultClass,
}
