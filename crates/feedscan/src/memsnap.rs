//! Resident-memory sampling for threshold checks and worker snapshots.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resident set size of the current process in bytes. Returns 0 when the
/// platform refuses to report it rather than failing the caller.
pub fn resident_bytes() -> u64 {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}

/// Current resident size when it exceeds `limit_bytes`, as (used, limit)
/// in megabytes.
pub fn over_limit(limit_bytes: u64) -> Option<(u64, u64)> {
    let resident = resident_bytes();
    if resident > limit_bytes {
        Some((resident / (1024 * 1024), limit_bytes / (1024 * 1024)))
    } else {
        None
    }
}
