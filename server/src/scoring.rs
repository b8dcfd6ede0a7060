//! Timing-to-outcome resolver for the pitch/swing minigame.
//!
//! Pure functions: raw event timestamps from a pitch or swing attempt are
//! reduced to accuracy/speed scalars, and a pitch/swing pair is resolved
//! into a discrete at-bat outcome. Both the human submission path and the
//! CPU surrogate feed through these same functions.

use rand::Rng;
use shared::{
    Flash, FlashPoint, FlashSequence, HitOutcome, HitResult, FLASH_BASE_INTERVAL_MS, FLASH_COUNT,
    MAX_SPEED, MIN_SPEED, TIMING_ERROR_BUDGET_MS,
};

/// Scores a timing submission against the flash sequence it answers.
///
/// Accumulates absolute error over the paired entries; one full error budget
/// of accumulated error (or any malformed input) floors the result at 0.
pub fn accuracy(timings: &[f64], flash_sequence: &[Flash]) -> f64 {
    let total_error: f64 = timings
        .iter()
        .zip(flash_sequence.iter())
        .map(|(timing, flash)| (timing - flash.time_ms).abs())
        .sum();

    (1.0 - total_error / TIMING_ERROR_BUDGET_MS).max(0.0)
}

/// Derives pitch speed (or swing power) from the interval between the first
/// two timing samples.
///
/// Fewer than two samples, a non-positive interval, or a non-finite result
/// all degrade to 0 rather than propagating.
pub fn speed(timings: &[f64]) -> f64 {
    if timings.len() < 2 {
        return 0.0;
    }

    let interval = timings[1] - timings[0];
    if !(interval > 0.0) {
        return 0.0;
    }

    let clamped = (FLASH_BASE_INTERVAL_MS / interval).clamp(MIN_SPEED, MAX_SPEED);
    if clamped.is_finite() {
        clamped
    } else {
        0.0
    }
}

/// Resolves an at-bat from the batter's and pitcher's scalars.
///
/// Hit chance is the mean of the two accuracies, raw power the mean of the
/// two speeds. Thresholds are half-open below, closed at the top.
pub fn resolve_hit(
    swing_accuracy: f64,
    swing_power: f64,
    pitch_speed: f64,
    pitch_accuracy: f64,
) -> HitResult {
    let hit_chance = (swing_accuracy + pitch_accuracy) / 2.0;
    let power = (swing_power + pitch_speed) / 2.0;

    if hit_chance < 0.3 {
        HitResult {
            outcome: HitOutcome::Strike,
            power: 0.0,
            accuracy: hit_chance,
        }
    } else if hit_chance < 0.6 {
        HitResult {
            outcome: HitOutcome::Foul,
            power: power * 0.5,
            accuracy: hit_chance,
        }
    } else if hit_chance < 0.8 {
        HitResult {
            outcome: HitOutcome::Hit,
            power,
            accuracy: hit_chance,
        }
    } else {
        HitResult {
            outcome: HitOutcome::HomeRun,
            power: power * 1.5,
            accuracy: hit_chance,
        }
    }
}

/// Generates a fresh flash sequence, spaced by the base interval divided by
/// the pitch speed. A degenerate speed falls back to the unit interval.
pub fn generate_flash_sequence<R: Rng>(rng: &mut R, pitch_speed: f64) -> FlashSequence {
    let speed = if pitch_speed.is_finite() && pitch_speed > 0.0 {
        pitch_speed
    } else {
        1.0
    };
    let interval = FLASH_BASE_INTERVAL_MS / speed;

    (0..FLASH_COUNT)
        .map(|i| Flash {
            time_ms: i as f64 * interval,
            position: FlashPoint {
                x: rng.gen_range(0.1..0.9),
                y: rng.gen_range(0.1..0.9),
            },
        })
        .collect()
}
