use crate::message::PeerEntry;

use tracing::debug;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub id: String,
    pub address: String,
    pub leader: bool,
}

pub type PeerSet = HashMap<String, PeerRecord>;

#[derive(Debug, Default)]
struct Membership {
    peers: PeerSet,
    leader: Option<String>,
}

/// The peer set and group leader as last announced by the group management
/// protocol. Shared between the inbound message path and the round loop.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    inner: RwLock<Membership>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        PeerDirectory::default()
    }

    /// Replaces the whole peer set; entries from earlier updates never survive.
    pub fn apply_membership_update(&self, records: Vec<PeerEntry>, sender_id: &str) {
        let mut peers = PeerSet::with_capacity(records.len());
        for PeerEntry { id, address } in records {
            let leader = id == sender_id;
            let _ = peers.insert(id.clone(), PeerRecord { id, address, leader });
        }
        let mut membership = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        debug!("peer set replaced: {} -> {} peers, leader = {}", membership.peers.len(), peers.len(), sender_id);
        membership.peers = peers;
        membership.leader = Some(sender_id.to_owned());
    }

    /// A point-in-time copy of the peer set, ordered by peer id.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let membership = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut peers: Vec<PeerRecord> = membership.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn leader(&self) -> Option<String> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).leader.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(ids: &[&str]) -> Vec<PeerEntry> {
        ids.iter().map(|id| PeerEntry::new(*id, format!("{}.local:5001", id))).collect()
    }

    fn ids(directory: &PeerDirectory) -> Vec<String> {
        directory.snapshot().into_iter().map(|peer| peer.id).collect()
    }

    #[test]
    fn starts_empty_without_leader() {
        let directory = PeerDirectory::new();
        assert!(directory.is_empty());
        assert_eq!(directory.leader(), None);
        assert!(directory.snapshot().is_empty());
    }

    #[test]
    fn each_update_replaces_the_previous_one() {
        let directory = PeerDirectory::new();
        let updates: Vec<(Vec<&str>, &str)> = vec![
            (vec!["a", "b", "c"], "a"),
            (vec!["c", "d"], "d"),
            (vec![], "e"),
            (vec!["b"], "b"),
        ];
        for (members, sender) in updates {
            directory.apply_membership_update(entries(&members), sender);
            let mut expected: Vec<String> = members.iter().map(|id| id.to_string()).collect();
            expected.sort();
            assert_eq!(ids(&directory), expected);
            assert_eq!(directory.leader(), Some(sender.to_owned()));
        }
    }

    #[test]
    fn only_the_sender_is_flagged_leader() {
        let directory = PeerDirectory::new();
        directory.apply_membership_update(entries(&["a", "b", "c"]), "b");
        let leaders: Vec<String> =
            directory.snapshot().into_iter().filter(|peer| peer.leader).map(|peer| peer.id).collect();
        assert_eq!(leaders, vec!["b".to_owned()]);

        // A sender outside the announced set is still the leader, but no record is flagged.
        directory.apply_membership_update(entries(&["a", "c"]), "b");
        assert!(directory.snapshot().iter().all(|peer| !peer.leader));
        assert_eq!(directory.leader(), Some("b".to_owned()));
    }

    #[test]
    fn snapshot_is_detached_from_later_updates() {
        let directory = PeerDirectory::new();
        directory.apply_membership_update(entries(&["a", "b"]), "a");
        let snapshot = directory.snapshot();
        directory.apply_membership_update(entries(&["z"]), "z");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].address, "a.local:5001");
        assert_eq!(ids(&directory), vec!["z".to_owned()]);
    }

    // Each update is a distinct, complete set; a snapshot mixing two of them would
    // be a torn read.
    #[test]
    fn snapshots_never_mix_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        const UPDATES: usize = 2_000;
        let sets: Vec<Vec<String>> = (0..8)
            .map(|n| (0..n + 1).map(|i| format!("g{}-p{}", n, i)).collect())
            .collect();
        let directory = Arc::new(PeerDirectory::new());

        let writer = {
            let directory = directory.clone();
            let sets = sets.clone();
            thread::spawn(move || {
                for u in 0..UPDATES {
                    let set = &sets[u % sets.len()];
                    let members: Vec<&str> = set.iter().map(|id| id.as_str()).collect();
                    directory.apply_membership_update(entries(&members), &set[0]);
                }
            })
        };

        let reader = {
            let directory = directory.clone();
            thread::spawn(move || {
                for _ in 0..UPDATES {
                    let snapshot = ids(&directory);
                    if snapshot.is_empty() {
                        continue;
                    }
                    let mut complete = sets.iter().map(|set| {
                        let mut set = set.clone();
                        set.sort();
                        set
                    });
                    assert!(complete.any(|set| set == snapshot), "torn snapshot {:?}", snapshot);
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
