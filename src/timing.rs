use rand::Rng;

pub const MIN_DELAY: f64 = 30.0;
pub const MAX_DELAY: f64 = 90.0;

/// Jitter added on top of the base inter-bet delay, drawn from a small fixed
/// set so the pacing never looks machine-perfect.
const BET_EXTRA_DELAYS: [f64; 6] = [0.3, 0.7, 1.1, 1.4, 0.9, 1.6];

/// Computes one farm action's delay from the step's remaining budgets.
///
/// The base target is `time_left / commands_left`, jittered and clamped into
/// [30, 90] seconds. Independently of the base, a 1.5% roll adds a 180-480s
/// long pause (simulated absence) and, only when that roll misses, a 3% roll
/// adds a 30-90s micro-pause. Non-positive budgets short-circuit to a flat
/// 30.0 instead of dividing by zero.
pub fn calculate_delay(time_left: f64, commands_left: i64) -> f64 {
    calculate_delay_with(&mut rand::thread_rng(), time_left, commands_left)
}

pub fn calculate_delay_with<R: Rng + ?Sized>(
    rng: &mut R,
    time_left: f64,
    commands_left: i64,
) -> f64 {
    if commands_left <= 0 || time_left <= 0.0 {
        return MIN_DELAY;
    }

    let target = time_left / commands_left as f64;

    let mut delay = if target < MIN_DELAY {
        rng.gen_range(MIN_DELAY..MIN_DELAY * 1.2)
    } else if target > MAX_DELAY {
        rng.gen_range(MAX_DELAY * 0.8..MAX_DELAY)
    } else {
        let low = (target * 0.85).max(MIN_DELAY);
        let high = (target * 1.15).min(MAX_DELAY);
        if low < high {
            rng.gen_range(low..high)
        } else {
            low
        }
    };

    if rng.gen::<f64>() < 0.015 {
        let long_delay = rng.gen_range(180.0..480.0);
        delay += long_delay;
        log::info!("   💤 Long delay: +{:.1} min", long_delay / 60.0);
    } else if rng.gen::<f64>() < 0.03 {
        let micro_pause = rng.gen_range(30.0..90.0);
        delay += micro_pause;
        log::debug!("   ⏸️ Micro-pause: +{micro_pause:.0}s");
    }

    (delay * 100.0).round() / 100.0
}

/// Randomized pacing between two bets.
pub fn bet_delay() -> f64 {
    bet_delay_with(&mut rand::thread_rng())
}

pub fn bet_delay_with<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let base = rng.gen_range(13.7..23.4);
    let extra = BET_EXTRA_DELAYS[rng.gen_range(0..BET_EXTRA_DELAYS.len())];
    base + extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_exhausted_budgets_return_floor() {
        assert_eq!(calculate_delay(0.0, 5), 30.0);
        assert_eq!(calculate_delay(100.0, 0), 30.0);
        assert_eq!(calculate_delay(-10.0, 5), 30.0);
        assert_eq!(calculate_delay(100.0, -1), 30.0);
    }

    #[test]
    fn test_base_delay_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for seed_case in 0..2000 {
            let time_left = 1.0 + (seed_case as f64 * 13.7) % 50_000.0;
            let commands_left = 1 + seed_case % 900;
            let delay = calculate_delay_with(&mut rng, time_left, commands_left);
            // The two extra-pause rolls can push past 90 but never below 30,
            // and never past the 480s long-pause ceiling on top of the base.
            assert!(delay >= MIN_DELAY, "delay {delay} below floor");
            assert!(delay <= MAX_DELAY + 480.0, "delay {delay} above ceiling");
        }
    }

    #[test]
    fn test_in_band_target_jitters_around_target() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            // target = 60s, comfortably inside [30, 90]
            let delay = calculate_delay_with(&mut rng, 600.0, 10);
            assert!(delay >= 51.0, "delay {delay} under 0.85x target");
            // 1.15x target unless an extra pause fired
            assert!(delay <= 69.0 + 480.0);
        }
    }

    #[test]
    fn test_floor_target_hugs_floor_band() {
        // target = 30s exactly: jitter band collapses to [30, 34.5]
        let mut rng = StdRng::seed_from_u64(3);
        let mut saw_plain = false;
        for _ in 0..200 {
            let delay = calculate_delay_with(&mut rng, 600.0, 20);
            assert!(delay >= 30.0);
            if delay <= 34.5 {
                saw_plain = true;
            } else {
                // An extra pause fired; still bounded by the long-delay cap.
                assert!(delay <= 34.5 + 480.0);
            }
        }
        assert!(saw_plain, "extra pauses should be rare");
    }

    #[test]
    fn test_rounded_to_two_decimals() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let delay = calculate_delay_with(&mut rng, 5000.0, 100);
            let scaled = delay * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bet_delay_range() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            let delay = bet_delay_with(&mut rng);
            assert!(delay >= 13.7 + 0.3);
            assert!(delay <= 23.4 + 1.6);
        }
    }
}
