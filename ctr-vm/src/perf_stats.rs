//! Frame statistics and host-side frame pacing.

use std::thread;
use std::time::{Duration, Instant};

/// Statistics over the interval since the previous reset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerfResults {
    /// System frames per wall-clock second.
    pub system_fps: f64,
    /// Game frames per wall-clock second.
    pub game_fps: f64,
    /// Mean wall-clock seconds spent per system frame.
    pub frametime: f64,
    /// Emulated time over wall time; 1.0 is native speed.
    pub emulation_speed: f64,
}

/// Per-session frame counters.
#[derive(Debug)]
pub struct PerfStats {
    reset_point: Instant,
    reset_point_system_us: u64,
    frame_begin: Instant,
    previous_frame_end: Instant,
    previous_frame_length: Duration,
    accumulated_frametime: Duration,
    system_frames: u32,
    game_frames: u32,
}

impl PerfStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            reset_point: now,
            reset_point_system_us: 0,
            frame_begin: now,
            previous_frame_end: now,
            previous_frame_length: Duration::ZERO,
            accumulated_frametime: Duration::ZERO,
            system_frames: 0,
            game_frames: 0,
        }
    }

    pub fn begin_system_frame(&mut self) {
        self.begin_system_frame_at(Instant::now());
    }

    fn begin_system_frame_at(&mut self, now: Instant) {
        self.frame_begin = now;
    }

    pub fn end_system_frame(&mut self) {
        self.end_system_frame_at(Instant::now());
    }

    fn end_system_frame_at(&mut self, frame_end: Instant) {
        self.accumulated_frametime += frame_end.saturating_duration_since(self.frame_begin);
        self.system_frames += 1;
        self.previous_frame_length = self.frame_begin.saturating_duration_since(self.previous_frame_end);
        self.previous_frame_end = frame_end;
    }

    pub fn end_game_frame(&mut self) {
        self.game_frames += 1;
    }

    /// Wall time between the end of the previous frame and the start of the last one.
    pub fn previous_frame_length(&self) -> Duration {
        self.previous_frame_length
    }

    pub fn get_and_reset_stats(&mut self, current_system_time_us: u64) -> PerfResults {
        self.get_and_reset_stats_at(current_system_time_us, Instant::now())
    }

    fn get_and_reset_stats_at(&mut self, current_system_time_us: u64, now: Instant) -> PerfResults {
        let interval = now.saturating_duration_since(self.reset_point).as_secs_f64();
        let system_us = current_system_time_us.saturating_sub(self.reset_point_system_us) as f64;

        let results = if interval > 0.0 {
            PerfResults {
                system_fps: self.system_frames as f64 / interval,
                game_fps: self.game_frames as f64 / interval,
                frametime: if self.system_frames > 0 {
                    self.accumulated_frametime.as_secs_f64() / self.system_frames as f64
                } else {
                    0.0
                },
                emulation_speed: system_us / interval / 1_000_000.0,
            }
        } else {
            PerfResults::default()
        };

        self.reset_point = now;
        self.reset_point_system_us = current_system_time_us;
        self.accumulated_frametime = Duration::ZERO;
        self.system_frames = 0;
        self.game_frames = 0;

        results
    }
}

impl Default for PerfStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest lag a run of slow frames may build up at 100% speed.
const MAX_LAG_US: i64 = 25_000;

/// Sleeps the host so emulated time does not run ahead of wall time.
#[derive(Debug)]
pub struct FrameLimiter {
    enabled: bool,
    speed_percent: u16,
    previous_system_time_us: u64,
    previous_walltime: Instant,
    delta_err_us: i64,
}

impl FrameLimiter {
    pub fn new(enabled: bool, speed_percent: u16) -> Self {
        Self {
            enabled,
            speed_percent,
            previous_system_time_us: 0,
            previous_walltime: Instant::now(),
            delta_err_us: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.speed_percent > 0
    }

    pub fn configure(&mut self, enabled: bool, speed_percent: u16) {
        self.enabled = enabled;
        self.speed_percent = speed_percent;
    }

    /// Restart pacing from emulated time zero, as a new session does.
    pub fn reset(&mut self) {
        self.previous_system_time_us = 0;
        self.previous_walltime = Instant::now();
        self.delta_err_us = 0;
    }

    pub fn do_frame_limiting(&mut self, current_system_time_us: u64) {
        if !self.is_enabled() {
            return;
        }
        let now = Instant::now();
        if let Some(sleep) = self.plan(current_system_time_us, now) {
            thread::sleep(sleep);
            let after = Instant::now();
            self.delta_err_us -= after.saturating_duration_since(now).as_micros() as i64;
            self.previous_walltime = after;
        }
    }

    /// Account for the emulated and wall time since the last call and return
    /// how long the host should sleep, if at all.
    fn plan(&mut self, current_system_time_us: u64, now: Instant) -> Option<Duration> {
        let scale = self.speed_percent as f64 / 100.0;
        let max_lag_us = (MAX_LAG_US as f64 / scale) as i64;

        let emulated_us = current_system_time_us.saturating_sub(self.previous_system_time_us);
        let wall_us = now.saturating_duration_since(self.previous_walltime).as_micros() as i64;
        self.delta_err_us += (emulated_us as f64 / scale) as i64;
        self.delta_err_us -= wall_us;
        self.delta_err_us = self.delta_err_us.clamp(-max_lag_us, max_lag_us);

        self.previous_system_time_us = current_system_time_us;
        self.previous_walltime = now;

        if self.delta_err_us > 0 {
            Some(Duration::from_micros(self.delta_err_us as u64))
        } else {
            None
        }
    }
}
