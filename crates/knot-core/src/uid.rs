use std::sync::atomic::{AtomicU64, Ordering};

use crate::variable::VariableKind;

/// Generate a fresh uid for a variable of the given kind, e.g. `Parameter12`.
///
/// Uids are unique for the life of the process: a single atomic counter is
/// shared by all kinds, so `Input3` and `Parameter3` never both exist.
pub fn generate_uid(kind: VariableKind) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", kind.name(), n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_prefix_follows_kind() {
        assert!(generate_uid(VariableKind::Parameter).starts_with("Parameter"));
        assert!(generate_uid(VariableKind::Placeholder).starts_with("Placeholder"));
    }

    #[test]
    fn test_unique_across_threads() {
        let uids: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        (0..100)
                            .map(|_| generate_uid(VariableKind::Input))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        let unique: HashSet<_> = uids.iter().collect();
        assert_eq!(unique.len(), 400);
    }
}
