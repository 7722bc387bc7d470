/// Input tick driver
///
/// Turns variable frame times into a whole number of fixed input ticks so
/// long-press timing and join timeouts advance at a consistent rate no matter
/// how fast the host renders.
use std::time::{Duration, Instant};

/// Default input tick rate (60 ticks per second)
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Maximum number of ticks run for a single frame to prevent a catch-up spiral
const MAX_TICKS_PER_FRAME: u32 = 5;

/// Fixed-timestep driver state
pub struct TickDriver {
    /// Length of one input tick
    timestep: Duration,

    /// Upper bound on ticks per frame
    max_ticks: u32,

    /// Accumulated time not yet turned into ticks
    accumulator: Duration,

    /// Time of last frame
    last_frame_time: Instant,

    /// Whether ticking is paused
    paused: bool,

    /// Current frame number
    frame_count: u64,

    /// Total ticks handed out
    tick_count: u64,
}

impl TickDriver {
    /// Create a driver with the given tick rate
    pub fn new(tick_rate: u32) -> Self {
        let now = Instant::now();
        let timestep = Duration::from_secs(1) / tick_rate.max(1);
        Self {
            timestep,
            max_ticks: MAX_TICKS_PER_FRAME,
            accumulator: Duration::ZERO,
            last_frame_time: now,
            paused: false,
            frame_count: 0,
            tick_count: 0,
        }
    }

    /// Override the catch-up cap
    pub fn with_max_ticks(mut self, max_ticks: u32) -> Self {
        self.max_ticks = max_ticks.max(1);
        self
    }

    /// Begin a new frame using wall-clock time, returns the number of ticks to run
    pub fn begin_frame(&mut self) -> u32 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time);
        self.last_frame_time = now;
        self.advance(frame_time)
    }

    /// Account for `frame_time` and return the number of ticks to run
    pub fn advance(&mut self, frame_time: Duration) -> u32 {
        self.frame_count += 1;

        // If paused, don't accumulate time for ticks
        if self.paused {
            return 0;
        }

        self.accumulator += frame_time;

        let mut ticks = 0;
        while self.accumulator >= self.timestep && ticks < self.max_ticks {
            self.accumulator -= self.timestep;
            ticks += 1;
        }

        // Drop time we refused to catch up on
        if ticks == self.max_ticks && self.accumulator >= self.timestep {
            log::debug!(
                "Input driver fell behind, dropping {:?}",
                self.accumulator
            );
            self.accumulator = Duration::ZERO;
        }

        self.tick_count += u64::from(ticks);
        ticks
    }

    /// Length of one tick
    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            log::info!("Input ticking paused");
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            // Reset accumulator to prevent a tick burst
            self.accumulator = Duration::ZERO;
            self.last_frame_time = Instant::now();
            log::info!("Input ticking resumed");
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }
}

impl Default for TickDriver {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE)
    }
}
