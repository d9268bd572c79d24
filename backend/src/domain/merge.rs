use std::collections::HashSet;

use shared::{Kid, Reward, Tx};

/// Entities that can be matched across the two stores by id.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for Kid {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Tx {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Reward {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Merge two lists by id: every `preferred` entry in its order, then the
/// `fallback` entries whose id `preferred` doesn't have.
pub fn merge_by_id<T: Identified + Clone>(preferred: &[T], fallback: &[T]) -> Vec<T> {
    let seen: HashSet<&str> = preferred.iter().map(Identified::id).collect();
    preferred
        .iter()
        .cloned()
        .chain(fallback.iter().filter(|item| !seen.contains(item.id())).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: &'static str,
        v: i32,
    }

    impl Identified for Row {
        fn id(&self) -> &str {
            self.id
        }
    }

    #[test]
    fn test_remote_wins_and_local_only_entries_survive() {
        let remote = vec![Row { id: "a", v: 1 }];
        let local = vec![Row { id: "a", v: 2 }, Row { id: "b", v: 3 }];
        assert_eq!(
            merge_by_id(&remote, &local),
            vec![Row { id: "a", v: 1 }, Row { id: "b", v: 3 }]
        );
    }

    #[test]
    fn test_empty_sides() {
        let local = vec![Row { id: "b", v: 3 }];
        assert_eq!(merge_by_id(&[], &local), local);
        assert_eq!(merge_by_id(&local, &[]), local);
    }
}
