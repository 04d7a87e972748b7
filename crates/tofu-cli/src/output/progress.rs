//! Progress line for a running sync

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Single-line progress indicator, redrawn at most every 100ms
pub struct ProgressBar {
    total: u64,
    current: u64,
    start_time: Instant,
    last_update: Option<Instant>,
    message: String,
}

impl ProgressBar {
    pub fn new(total: u64, message: impl Into<String>) -> Self {
        Self {
            total,
            current: 0,
            start_time: Instant::now(),
            last_update: None,
            message: message.into(),
        }
    }

    /// The total is only known once the remote has been enumerated
    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    pub fn update(&mut self, current: u64) {
        self.current = current;
        let now = Instant::now();
        let due = self
            .last_update
            .map_or(true, |last| now.duration_since(last) > Duration::from_millis(100));
        if due {
            self.display();
            self.last_update = Some(now);
        }
    }

    pub fn increment(&mut self) {
        self.update(self.current + 1);
    }

    pub fn finish(&self) {
        self.display();
        println!();
    }

    pub fn percentage(&self) -> u64 {
        if self.total > 0 {
            (self.current * 100) / self.total
        } else {
            0
        }
    }

    fn display(&self) {
        let elapsed = self.start_time.elapsed().as_secs();
        let rate = if elapsed > 0 { self.current / elapsed } else { 0 };

        print!(
            "\r{} [{}/{}] {}% ({}/s)",
            self.message,
            self.current,
            self.total,
            self.percentage(),
            rate
        );
        let _ = io::stdout().flush();
    }
}
