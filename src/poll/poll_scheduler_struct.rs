// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use rand::Rng;

// From standard library
use std::time::Duration;

// From this library
use crate::config::PollConfig;
use crate::poll::PollTrigger;

/// Delay before an operator-requested poll.
pub const POLL_NOW_DELAY: Duration = Duration::from_secs(2);

/// Delay before re-checking an inhibited poll.
pub const POLL_SHORT_DELAY: Duration = Duration::from_secs(15);

/// Bounds of the startup jitter factor applied to the regular interval, so
/// a fleet rebooting together does not poll together.
const STARTUP_JITTER: (f64, f64) = (0.1, 0.9);

/// Computes when the poll collaborator runs next.
///
/// Failed attempts stretch the regular interval linearly (interval ×
/// (errors + 1)) up to the configured cap; any successful attempt resets
/// the stretch. A conditional request answered `304 Not Modified` counts as
/// successful: the bundle being unchanged is a healthy outcome.
#[derive(Debug)]
pub struct PollScheduler {
    interval: Duration,
    max_interval: Option<Duration>,
    recent_error_count: u32,
}

impl PollScheduler {
    /// Creates a scheduler over a poll configuration.
    pub fn new(config: &PollConfig) -> PollScheduler {
        PollScheduler {
            interval: Duration::from_millis(config.interval_ms() as u64),
            max_interval: config
                .max_interval_ms()
                .map(|ms| Duration::from_millis(ms as u64)),
            recent_error_count: 0,
        }
    }

    /// Returns the delay before the next poll for `trigger`.
    pub fn next_delay(&self, trigger: PollTrigger) -> Duration {
        let delay = match trigger {
            PollTrigger::Manual => POLL_NOW_DELAY,
            PollTrigger::Inhibited => POLL_SHORT_DELAY,
            PollTrigger::Startup => {
                let factor = rand::thread_rng().gen_range(STARTUP_JITTER.0..STARTUP_JITTER.1);

                self.interval.mul_f64(factor)
            }
            PollTrigger::Regular => {
                let scaled = self
                    .interval
                    .saturating_mul(self.recent_error_count.saturating_add(1));

                match self.max_interval {
                    Some(max) => scaled.min(max),
                    None => scaled,
                }
            }
        };

        log::debug!(
            "PollScheduler::next_delay {:?} trigger sleeps {:?}",
            trigger,
            delay
        );

        delay
    }

    /// Records a successful attempt and resets the error stretch.
    pub fn attempt_succeeded(&mut self) {
        self.recent_error_count = 0;
    }

    /// Records a failed attempt.
    pub fn attempt_failed(&mut self) {
        self.recent_error_count = self.recent_error_count.saturating_add(1);
    }

    /// Returns the number of failures since the last success.
    pub fn recent_error_count(&self) -> u32 {
        self.recent_error_count
    }
}
