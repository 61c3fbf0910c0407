//! Host resource probes: logical CPU count and load average.

/// Number of logical processors online, at least 1.
pub fn cpu_count() -> usize {
    #[cfg(unix)]
    {
        let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if count > 0 {
            return count as usize;
        }
    }

    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Sample the 1-minute load average.
///
/// Returns `None` when the platform cannot report it.
pub fn load_average() -> Option<f64> {
    let mut samples = [0f64; 1];
    let n = unsafe { libc::getloadavg(samples.as_mut_ptr(), 1) };
    if n < 1 {
        return None;
    }

    let load = samples[0];
    load.is_finite().then_some(load)
}
