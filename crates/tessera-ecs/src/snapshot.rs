//! Arena identity snapshot and restore.
//!
//! [`ArenaSnapshot`] captures which `(slot, generation)` pairs are live and
//! the free-list order, so that a restored arena resolves every previously
//! minted handle exactly as the original did and hands out the same slots in
//! the same order afterwards. Component data is not part of the snapshot;
//! restored entities come back with no components attached.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::arena::{ArenaConfig, EntityArena, ReusePolicy, Slot};
use crate::component::ComponentRegistry;
use crate::EcsError;

/// Serializable identity state of an [`EntityArena`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaSnapshot {
    /// Per-slot generation counters.
    pub generations: Vec<u32>,
    /// Per-slot occupied flags.
    pub occupied: Vec<bool>,
    /// Free slots in reuse order. Unoccupied slots missing from this list are
    /// retired.
    pub free_slots: Vec<u32>,
    /// Reuse policy of the captured arena.
    pub reuse_policy: ReusePolicy,
}

impl ArenaSnapshot {
    /// Number of live entities recorded.
    pub fn live_count(&self) -> usize {
        self.occupied.iter().filter(|&&occupied| occupied).count()
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, EcsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string. The result is not validated until it is
    /// passed to [`EntityArena::restore_from_snapshot`].
    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        Ok(serde_json::from_str(json)?)
    }

    fn validate(&self) -> Result<(), String> {
        if self.generations.len() != self.occupied.len() {
            return Err(format!(
                "{} generations vs {} occupied flags",
                self.generations.len(),
                self.occupied.len()
            ));
        }
        if self.generations.len() >= u32::MAX as usize {
            return Err(format!("{} slots exceed the slot index space", self.generations.len()));
        }

        let mut listed = HashSet::with_capacity(self.free_slots.len());
        for &index in &self.free_slots {
            let Some(&occupied) = self.occupied.get(index as usize) else {
                return Err(format!(
                    "free slot {index} out of range ({} slots)",
                    self.occupied.len()
                ));
            };
            if occupied {
                return Err(format!("free slot {index} is marked occupied"));
            }
            if !listed.insert(index) {
                return Err(format!("free slot {index} listed twice"));
            }
        }

        for (index, (&occupied, &generation)) in
            self.occupied.iter().zip(&self.generations).enumerate()
        {
            if !occupied && generation != u32::MAX && !listed.contains(&(index as u32)) {
                return Err(format!(
                    "slot {index} is free but neither listed nor retired"
                ));
            }
        }
        Ok(())
    }
}

impl EntityArena {
    /// Capture the identity state of the arena.
    pub fn capture_snapshot(&self) -> ArenaSnapshot {
        let slots = self.slots();
        ArenaSnapshot {
            generations: slots.iter().map(|slot| slot.generation).collect(),
            occupied: slots.iter().map(|slot| slot.occupied).collect(),
            free_slots: self.free_slots(),
            reuse_policy: self.config().reuse_policy,
        }
    }

    /// Rebuild an arena from a snapshot.
    ///
    /// Live entities are restored with empty component sets; components
    /// attached afterwards are keyed by ids from `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidSnapshot`] if the snapshot is internally
    /// inconsistent (length mismatch, free slot out of range, occupied or
    /// listed twice, or an unlisted free slot that is not retired).
    pub fn restore_from_snapshot(
        snapshot: &ArenaSnapshot,
        registry: Arc<ComponentRegistry>,
    ) -> Result<Self, EcsError> {
        if let Err(details) = snapshot.validate() {
            tracing::warn!(%details, "rejected arena snapshot");
            return Err(EcsError::InvalidSnapshot { details });
        }

        let slots: Vec<Slot> = snapshot
            .generations
            .iter()
            .zip(&snapshot.occupied)
            .map(|(&generation, &occupied)| Slot {
                generation,
                occupied,
                ..Default::default()
            })
            .collect();

        let config = ArenaConfig {
            initial_capacity: slots.len(),
            reuse_policy: snapshot.reuse_policy,
        };
        let arena = EntityArena::from_parts(slots, &snapshot.free_slots, config, registry);
        tracing::debug!(
            live = arena.len(),
            slots = arena.slot_count(),
            "restored arena from snapshot"
        );
        Ok(arena)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(generations: Vec<u32>, occupied: Vec<bool>, free_slots: Vec<u32>) -> ArenaSnapshot {
        ArenaSnapshot {
            generations,
            occupied,
            free_slots,
            reuse_policy: ReusePolicy::LowestIndex,
        }
    }

    fn restore(s: &ArenaSnapshot) -> Result<EntityArena, EcsError> {
        EntityArena::restore_from_snapshot(s, Arc::new(ComponentRegistry::new()))
    }

    #[test]
    fn capture_records_generations_and_free_list() {
        let mut arena = EntityArena::with_registry(
            ArenaConfig {
                reuse_policy: ReusePolicy::Fifo,
                ..Default::default()
            },
            Arc::new(ComponentRegistry::new()),
        );
        let hs: Vec<_> = (0..4).map(|_| arena.create().create_reference()).collect();
        arena.destroy(hs[2]).unwrap();
        arena.destroy(hs[0]).unwrap();

        let s = arena.capture_snapshot();
        assert_eq!(s.generations, vec![1, 0, 1, 0]);
        assert_eq!(s.occupied, vec![false, true, false, true]);
        assert_eq!(s.free_slots, vec![2, 0]);
        assert_eq!(s.reuse_policy, ReusePolicy::Fifo);
        assert_eq!(s.live_count(), 2);
    }

    #[test]
    fn valid_snapshot_restores() {
        let s = snapshot(vec![3, 0, u32::MAX], vec![true, false, false], vec![1]);
        let arena = restore(&s).unwrap();
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.slot_count(), 3);
        assert_eq!(arena.free_count(), 1);
        assert_eq!(arena.capture_snapshot(), s);
    }

    #[test]
    fn length_mismatch_rejected() {
        let s = snapshot(vec![0, 0], vec![true], vec![]);
        assert!(matches!(restore(&s), Err(EcsError::InvalidSnapshot { .. })));
    }

    #[test]
    fn free_slot_out_of_range_rejected() {
        let s = snapshot(vec![0], vec![false], vec![0, 5]);
        assert!(matches!(restore(&s), Err(EcsError::InvalidSnapshot { .. })));
    }

    #[test]
    fn occupied_free_slot_rejected() {
        let s = snapshot(vec![0, 0], vec![true, true], vec![1]);
        assert!(matches!(restore(&s), Err(EcsError::InvalidSnapshot { .. })));
    }

    #[test]
    fn duplicate_free_slot_rejected() {
        let s = snapshot(vec![1, 0], vec![false, true], vec![0, 0]);
        assert!(matches!(restore(&s), Err(EcsError::InvalidSnapshot { .. })));
    }

    #[test]
    fn unlisted_free_slot_rejected() {
        let s = snapshot(vec![1, 0], vec![false, true], vec![]);
        let err = restore(&s).unwrap_err();
        assert!(err.to_string().contains("neither listed nor retired"));
    }

    #[test]
    fn json_roundtrip() {
        let s = snapshot(vec![2, 0], vec![false, true], vec![0]);
        let json = s.to_json().unwrap();
        assert!(json.contains("\"lowest_index\""));
        assert_eq!(ArenaSnapshot::from_json(&json).unwrap(), s);
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        assert!(matches!(
            ArenaSnapshot::from_json("{ not json"),
            Err(EcsError::Serialization(_))
        ));
    }
}
