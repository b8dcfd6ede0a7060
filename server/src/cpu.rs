//! CPU surrogate driver: stands in for an absent human in either role.
//!
//! Each CPU-held role gets one driver task. On a fixed period it waits out a
//! simulated reaction delay and then posts a submit message into the
//! coordinator queue, where it goes through the exact same resolver path as
//! a human timing submission. The coordinator re-checks role ownership when
//! the message is processed, so a submit that was already in flight when a
//! human claimed the role is dropped rather than overwriting their state.

use crate::network::ServerMessage;
use log::debug;
use rand::Rng;
use shared::{Flash, Role, CPU_PERIOD_MS, CPU_REACTION_DELAY_MS, CPU_TIMING_NOISE_MS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Handle to a running CPU role task. Dropping it cancels the timer, which
/// is how the coordinator stops the CPU the moment a human claims the role.
pub struct CpuDriver {
    role: Role,
    handle: JoinHandle<()>,
}

impl CpuDriver {
    /// Spawns the driver loop for a role with explicit timings (tests use
    /// short ones; production uses [`CpuDriver::spawn`]).
    pub fn spawn_with_timing(
        role: Role,
        tx: mpsc::UnboundedSender<ServerMessage>,
        period: Duration,
        reaction_delay: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the CPU acts on
            // the period, not on spawn.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                tokio::time::sleep(reaction_delay).await;
                if tx.send(ServerMessage::CpuSubmit { role }).is_err() {
                    // Coordinator is gone; nothing left to drive.
                    break;
                }
            }
        });

        debug!("CPU driver started for {:?}", role);
        Self { role, handle }
    }

    /// Spawns a driver with the standard period and reaction delay.
    pub fn spawn(role: Role, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self::spawn_with_timing(
            role,
            tx,
            Duration::from_millis(CPU_PERIOD_MS),
            Duration::from_millis(CPU_REACTION_DELAY_MS),
        )
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl Drop for CpuDriver {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("CPU driver stopped for {:?}", self.role);
    }
}

/// Synthesizes the timings a mediocre human would produce for a sequence:
/// each flash's nominal time plus uniform noise.
pub fn synthesize_timings<R: Rng>(rng: &mut R, flash_sequence: &[Flash]) -> Vec<f64> {
    flash_sequence
        .iter()
        .map(|flash| flash.time_ms + rng.gen_range(-CPU_TIMING_NOISE_MS..CPU_TIMING_NOISE_MS))
        .collect()
}
