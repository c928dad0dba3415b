use warden_dns_domain::StatsEntry;

/// Opaque statistics collaborator.
pub trait StatsSink: Send + Sync {
    fn update(&self, entry: StatsEntry);
}
