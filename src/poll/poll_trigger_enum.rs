// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library

/// Why the next poll is being scheduled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum PollTrigger {
    /// First poll after service startup.
    Startup,
    /// Regular tick.
    Regular,
    /// An operator asked for a poll now.
    Manual,
    /// Polling is inhibited (install in progress, inhibit file present);
    /// check again soon.
    Inhibited,
}
