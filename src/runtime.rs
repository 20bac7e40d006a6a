// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame driver: turns a target tick rate into a sequence of
//! `World::tick` calls, either at a variable delta or at a fixed
//! timestep with catch-up steps.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::time::{FixedTime, Time};
use crate::world::World;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Target ticks per second. Also the fixed-timestep frequency when
    /// `fixed_tick` is set.
    pub fps: u32,
    /// Run every tick at exactly `1/fps` seconds of simulated time,
    /// catching up with extra ticks on a slow frame, instead of passing
    /// each tick the real elapsed delta.
    pub fixed_tick: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fps: 60,
            fixed_tick: false,
        }
    }
}

/// Drives `world` until `should_stop` returns true, pacing ticks to
/// `options.fps`. A fixed-tick run can execute more than one
/// `World::tick` per loop iteration to catch up after a slow frame; a
/// variable-tick run always executes exactly one, with that frame's
/// real elapsed seconds as `dt`.
pub fn run(world: &mut World, options: RunOptions, mut should_stop: impl FnMut() -> bool) -> Result<()> {
    let frame_budget = Duration::from_secs_f32(1.0 / options.fps.max(1) as f32);
    let mut time = Time::new();
    let mut fixed = FixedTime::new(options.fps.max(1));

    while !should_stop() {
        let frame_start = Instant::now();
        time.update();

        if options.fixed_tick {
            let steps = fixed.tick(time.delta());
            for _ in 0..steps {
                world.tick(fixed.timestep_seconds())?;
            }
        } else {
            world.tick(time.delta_seconds())?;
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame_budget {
            thread::sleep(frame_budget - elapsed);
        }
    }
    Ok(())
}
