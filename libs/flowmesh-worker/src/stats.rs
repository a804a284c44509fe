use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// Per-tick bookkeeping the worker folds into the `_metrics` frame every
/// `metrics_interval` (§4.4 step 7, §4.5).
pub struct Stats {
    system: System,
    pid: Pid,
    uptime_count: u64,
    frame_count: u64,
    megapx_count: f64,
    fps_ema: f64,
    last_tick_at: Option<std::time::Instant>,
}

/// Smoothing factor for the FPS exponential moving average. Chosen to track
/// a few seconds of recent history without being noisy tick to tick.
const FPS_EMA_ALPHA: f64 = 0.2;

impl Stats {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_cpu().with_memory()),
        );
        Self {
            system,
            pid,
            uptime_count: 0,
            frame_count: 0,
            megapx_count: 0.0,
            fps_ema: 0.0,
            last_tick_at: None,
        }
    }

    /// Folds in one tick's worth of work: advances uptime/frame counters,
    /// accumulates megapixels, and updates the FPS EMA from wall-clock
    /// spacing between ticks.
    pub fn record_tick(&mut self, megapixels: f64) {
        self.uptime_count += 1;
        self.frame_count += 1;
        self.megapx_count += megapixels;

        let now = std::time::Instant::now();
        if let Some(prev) = self.last_tick_at {
            let dt = now.duration_since(prev).as_secs_f64();
            if dt > 0.0 {
                let instantaneous = 1.0 / dt;
                self.fps_ema = if self.fps_ema == 0.0 {
                    instantaneous
                } else {
                    FPS_EMA_ALPHA * instantaneous + (1.0 - FPS_EMA_ALPHA) * self.fps_ema
                };
            }
        }
        self.last_tick_at = Some(now);
    }

    pub fn fps(&self) -> f64 {
        self.fps_ema
    }

    pub fn uptime_count(&self) -> u64 {
        self.uptime_count
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn megapx_count(&self) -> f64 {
        self.megapx_count
    }

    /// Refreshes and returns (cpu_percent, rss_bytes) for this process.
    pub fn sample_process(&mut self) -> (f32, u64) {
        self.system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        match self.system.process(self.pid) {
            Some(proc) => (proc.cpu_usage(), proc.memory()),
            None => (0.0, 0),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_advance_and_megapixels_accumulate() {
        let mut stats = Stats::new();
        stats.record_tick(2.0);
        stats.record_tick(3.5);
        assert_eq!(stats.uptime_count(), 2);
        assert_eq!(stats.frame_count(), 2);
        assert_eq!(stats.megapx_count(), 5.5);
    }
}
