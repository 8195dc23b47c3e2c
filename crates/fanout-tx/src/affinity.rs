//! CPU affinity

use core_affinity::CoreId;
use fanout_common::{FanoutError, FanoutResult};

/// CPU topology seen by the pool
pub trait CpuTopology: Send + Sync {
    /// Upper bound of the CPU ids a worker may be pinned to
    fn online_cpus(&self) -> usize;

    /// True if a worker may be pinned to `cpu`
    fn is_online(&self, cpu: usize) -> bool {
        cpu < self.online_cpus()
    }

    /// Pin the calling thread to `cpu`
    fn pin_current(&self, cpu: usize) -> bool;
}

/// Host topology via `core_affinity`
///
/// CPU ids are the ones in the process affinity mask, which need not be
/// contiguous under a cpuset.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTopology;

impl SystemTopology {
    fn core_ids() -> Option<Vec<usize>> {
        core_affinity::get_core_ids()
            .map(|ids| ids.into_iter().map(|c| c.id).collect::<Vec<_>>())
            .filter(|ids| !ids.is_empty())
    }

    fn parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl CpuTopology for SystemTopology {
    fn online_cpus(&self) -> usize {
        Self::core_ids()
            .and_then(|ids| ids.into_iter().max())
            .map(|max| max + 1)
            .unwrap_or_else(Self::parallelism)
    }

    fn is_online(&self, cpu: usize) -> bool {
        match Self::core_ids() {
            Some(ids) => ids.contains(&cpu),
            None => cpu < Self::parallelism(),
        }
    }

    fn pin_current(&self, cpu: usize) -> bool {
        core_affinity::set_for_current(CoreId { id: cpu })
    }
}

/// Every CPU online and no CPU used twice
pub fn check_affinity(cpus: &[usize], topology: &dyn CpuTopology) -> FanoutResult<()> {
    let online = topology.online_cpus();
    let mut in_use = Vec::with_capacity(cpus.len());

    for (index, &cpu) in cpus.iter().enumerate() {
        if !topology.is_online(cpu) {
            tracing::warn!(index, cpu, online, "Tx thread bad affinity");
            return Err(FanoutError::BadAffinity { index, cpu, online });
        }
        if in_use.contains(&cpu) {
            tracing::warn!(index, cpu, "Tx thread cpu already in use");
            return Err(FanoutError::CpuInUse { index, cpu });
        }
        in_use.push(cpu);
    }

    Ok(())
}
