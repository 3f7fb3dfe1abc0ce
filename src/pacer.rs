/*
 *  pacer.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Fixed-interval tick pacing for sampling loops
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */
use std::thread;
use std::time::{Duration, Instant};

pub struct Pacer {
    next_deadline: Instant,
    frame: Duration,
}

// deadlines are measured from the previous tick, not from when the
// tick's work finished, so a slow callback eats into the next sleep
impl Pacer {
    pub fn new(frame: Duration) -> Self {
        Self { next_deadline: Instant::now() + frame, frame }
    }

    /// Time left until the next deadline
    pub fn remaining(&self) -> Duration {
        self.next_deadline.saturating_duration_since(Instant::now())
    }

    /// Block until the next deadline, then schedule the one after.
    /// An overrun restarts the schedule from now instead of bursting.
    pub fn wait(&mut self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            thread::sleep(remaining);
            self.next_deadline += self.frame;
        } else {
            self.next_deadline = Instant::now() + self.frame;
        }
    }
}
