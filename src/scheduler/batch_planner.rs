//! Batch Planner (component D, spec §3, §4.1).
//!
//! Splits the enabled device inventory into `BatchPlan::partitions` sized
//! so there are roughly `batch.target_count` batches per tick, clamped to
//! `[batch.min_size, batch.max_size]`. Partition membership is reshuffled
//! every tick via a seeded hash so that, over many ticks, no single batch
//! always contains the same slow devices (spec §4.1).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::BatchConfig;
use crate::types::{BatchPlan, DeviceId};

/// Compute the batch size for `device_count` devices per `cfg`: target
/// `ceil(device_count / target_count)`, rounded up to the nearest 50, then
/// clamped to `[min_size, max_size]` (spec §4.1 algorithm).
pub fn batch_size_for(device_count: usize, cfg: &BatchConfig) -> usize {
    if device_count == 0 {
        return cfg.min_size;
    }
    let raw = device_count.div_ceil(cfg.target_count);
    let rounded = raw.div_ceil(50) * 50;
    rounded.clamp(cfg.min_size, cfg.max_size)
}

/// Build a `BatchPlan` for this tick. `tick_index` seeds the partition
/// hash so that device-to-batch assignment varies tick over tick without
/// needing external randomness (keeps scheduling deterministic and
/// reproducible in tests).
pub fn plan(device_ids: &[DeviceId], cfg: &BatchConfig, tick_index: u64) -> BatchPlan {
    let batch_size = batch_size_for(device_ids.len(), cfg);
    let batch_count = if device_ids.is_empty() {
        0
    } else {
        device_ids.len().div_ceil(batch_size)
    };

    let mut partitions: Vec<Vec<DeviceId>> = vec![Vec::new(); batch_count.max(1)];
    for id in device_ids {
        let mut hasher = DefaultHasher::new();
        tick_index.hash(&mut hasher);
        id.hash(&mut hasher);
        let slot = (hasher.finish() as usize) % partitions.len();
        partitions[slot].push(id.clone());
    }
    if device_ids.is_empty() {
        partitions.clear();
    }

    BatchPlan {
        batch_size,
        partitions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BatchConfig {
        BatchConfig {
            min_size: 50,
            max_size: 500,
            target_count: 10,
        }
    }

    #[test]
    fn batch_size_targets_roughly_ten_batches() {
        assert_eq!(batch_size_for(875, &cfg()), 100);
        assert_eq!(batch_size_for(40, &cfg()), 50);
        assert_eq!(batch_size_for(10_000, &cfg()), 500);
    }

    #[test]
    fn batch_size_never_leaves_the_clamp_bounds() {
        for n in [1, 49, 50, 51, 499, 500, 501, 50_000] {
            let size = batch_size_for(n, &cfg());
            assert!((50..=500).contains(&size), "size {size} out of bounds for n={n}");
        }
    }

    #[test]
    fn plan_covers_every_device_exactly_once() {
        let ids: Vec<DeviceId> = (0..875).map(|i| DeviceId::from(format!("d{i}"))).collect();
        let plan = plan(&ids, &cfg(), 1);
        assert_eq!(plan.total_devices(), 875);

        let mut seen = std::collections::HashSet::new();
        for partition in &plan.partitions {
            for id in partition {
                assert!(seen.insert(id.clone()), "device {id} appeared in more than one batch");
            }
        }
        assert_eq!(seen.len(), 875);
    }

    #[test]
    fn partition_membership_varies_across_ticks() {
        let ids: Vec<DeviceId> = (0..200).map(|i| DeviceId::from(format!("d{i}"))).collect();
        let plan_a = plan(&ids, &cfg(), 1);
        let plan_b = plan(&ids, &cfg(), 2);

        let slot_of = |plan: &BatchPlan, id: &DeviceId| {
            plan.partitions.iter().position(|p| p.contains(id))
        };

        let differing = ids
            .iter()
            .filter(|id| slot_of(&plan_a, id) != slot_of(&plan_b, id))
            .count();
        assert!(differing > 0, "expected at least some devices to move batches between ticks");
    }

    #[test]
    fn empty_inventory_plans_zero_batches() {
        let plan_result = plan(&[], &cfg(), 1);
        assert_eq!(plan_result.batch_count(), 0);
    }
}
