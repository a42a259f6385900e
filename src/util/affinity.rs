//! CPU placement for pipeline threads
//!
//! Pool threads can be pinned to a core as they start, and any thread can
//! ask which core it is on right now. Both only work on Linux; elsewhere
//! pinning fails and placement is unknown.

use crate::Result;
use anyhow::Context;

/// Pin the calling thread to a single CPU core
#[cfg(target_os = "linux")]
pub fn pin_current_thread(core: usize) -> Result<()> {
    let limit = libc::CPU_SETSIZE as usize;
    if core >= limit {
        anyhow::bail!("CPU core {} is beyond the affinity mask (limit {})", core, limit);
    }

    // SAFETY: cpu_set_t is plain data; zeroed is the empty set
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };

    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("sched_setaffinity to core {} failed", core));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(core: usize) -> Result<()> {
    anyhow::bail!("Cannot pin to core {}: CPU affinity needs Linux", core)
}

/// Core the calling thread is running on
#[cfg(target_os = "linux")]
pub fn current_cpu() -> Option<usize> {
    // SAFETY: no arguments, no memory access
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<usize> {
    None
}

/// Parse a core list such as `"0,2-4,7"` into sorted, unique core ids
///
/// ```
/// use hpcdemo::util::affinity::parse_cpu_list;
///
/// assert_eq!(parse_cpu_list("7,0,2-4").unwrap(), vec![0, 2, 3, 4, 7]);
/// ```
pub fn parse_cpu_list(list: &str) -> Result<Vec<usize>> {
    let parse_core = |text: &str| -> Result<usize> {
        text.trim()
            .parse::<usize>()
            .with_context(|| format!("'{}' is not a CPU core number", text.trim()))
    };

    let mut cores = Vec::new();
    for item in list.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        match item.split_once('-') {
            Some((low, high)) => {
                let (low, high) = (parse_core(low)?, parse_core(high)?);
                if low > high {
                    anyhow::bail!("CPU range {} runs backwards", item);
                }
                cores.extend(low..=high);
            }
            None => cores.push(parse_core(item)?),
        }
    }

    if cores.is_empty() {
        anyhow::bail!("CPU core list '{}' names no cores", list);
    }
    cores.sort_unstable();
    cores.dedup();
    Ok(cores)
}

/// Log a warning when the pool has more threads than the host has cores
///
/// Returns whether the pool is oversubscribed.
pub fn warn_if_oversubscribed(threads: usize) -> bool {
    let cpus = num_cpus::get();
    let oversubscribed = threads > cpus;
    if oversubscribed {
        log::warn!("{} pipeline threads on {} CPUs; threads will share cores", threads, cpus);
    }
    oversubscribed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0").unwrap(), vec![0]);
        assert_eq!(parse_cpu_list("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list(" 4 , 1-2 ,1").unwrap(), vec![1, 2, 4]);
    }

    #[test]
    fn test_parse_cpu_list_rejects_garbage() {
        assert!(parse_cpu_list("").is_err());
        assert!(parse_cpu_list(" , ").is_err());
        assert!(parse_cpu_list("0,abc").is_err());
        assert!(parse_cpu_list("5-2").is_err());
        assert!(parse_cpu_list("0-2-4").is_err());
    }

    #[test]
    fn test_oversubscription() {
        let cpus = num_cpus::get();
        assert!(!warn_if_oversubscribed(cpus));
        assert!(warn_if_oversubscribed(cpus + 1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pin_and_query() {
        std::thread::spawn(|| {
            // the core we are already on is always in the allowed set
            let core = current_cpu().unwrap();
            pin_current_thread(core).unwrap();
            assert_eq!(current_cpu(), Some(core));
        })
        .join()
        .unwrap();

        assert!(pin_current_thread(usize::MAX).is_err());
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn test_pinning_unsupported() {
        assert!(pin_current_thread(0).is_err());
        assert_eq!(current_cpu(), None);
    }
}
