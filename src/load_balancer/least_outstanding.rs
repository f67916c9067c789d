//! Least-outstanding-requests selection.

use std::collections::HashSet;
use std::sync::Arc;

use crate::load_balancer::host::HostKey;
use crate::load_balancer::HostEntry;

/// A candidate picked from the registry together with the outstanding count
/// it was chosen on, so the caller can claim it with a compare-and-swap.
pub(crate) struct Candidate<'a> {
    pub entry: &'a Arc<HostEntry>,
    pub outstanding: usize,
}

/// Pick the eligible entry with the fewest outstanding requests.
///
/// Ties go to the fewest cumulative errors, then to registration order
/// (`min_by_key` keeps the first minimum).
pub(crate) fn pick<'a>(
    entries: &'a [Arc<HostEntry>],
    excluded: &HashSet<HostKey>,
) -> Option<Candidate<'a>> {
    entries
        .iter()
        .filter(|e| e.host.is_healthy() && !excluded.contains(e.host.key()))
        .map(|e| (e, e.counters.outstanding(), e.counters.errors()))
        .min_by_key(|&(_, outstanding, errors)| (outstanding, errors))
        .map(|(entry, outstanding, _)| Candidate { entry, outstanding })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::host::Host;

    fn entries(names: &[&str]) -> Vec<Arc<HostEntry>> {
        names
            .iter()
            .map(|n| Arc::new(HostEntry::new(Arc::new(Host::new(*n)))))
            .collect()
    }

    #[test]
    fn test_least_outstanding() {
        let entries = entries(&["a", "b"]);
        entries[0].counters.start();

        let picked = pick(&entries, &HashSet::new()).unwrap();
        assert_eq!(picked.entry.host.name(), "b");

        entries[1].counters.start();
        entries[1].counters.start(); // b has 2, a has 1

        let picked = pick(&entries, &HashSet::new()).unwrap();
        assert_eq!(picked.entry.host.name(), "a");
        assert_eq!(picked.outstanding, 1);
    }

    #[test]
    fn test_ties_break_on_errors_then_order() {
        let entries = entries(&["a", "b", "c"]);
        assert_eq!(pick(&entries, &HashSet::new()).unwrap().entry.host.name(), "a");

        entries[0].counters.start();
        entries[0].counters.complete(false);
        assert_eq!(pick(&entries, &HashSet::new()).unwrap().entry.host.name(), "b");
    }

    #[test]
    fn test_skips_unhealthy_and_excluded() {
        let entries = entries(&["a", "b", "c"]);
        entries[0].host.set_healthy(false);
        let excluded: HashSet<HostKey> = [entries[1].host.key().clone()].into_iter().collect();

        assert_eq!(pick(&entries, &excluded).unwrap().entry.host.name(), "c");

        entries[2].host.set_healthy(false);
        assert!(pick(&entries, &excluded).is_none());
    }
}
