//! The arrival-rate math (§4.3). These are pure functions over elapsed time
//! so they can be property-tested in isolation from the executor and the
//! session pool; `PhaseInstance` is the only caller.

/// Ceiling integer division. Used by the rate-based arrival processes to
/// compute their next self-re-entry deadline without accumulating drift.
pub fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    if denominator <= 0 {
        return i64::MAX;
    }
    (numerator + denominator - 1) / denominator
}

/// `required = floor(delta * lambda / 1000)` (§4.3.3).
pub fn constant_per_sec_required(delta_ms: u64, lambda: f64) -> u64 {
    ((delta_ms as f64) * lambda / 1000.0).floor().max(0.0) as u64
}

/// `nextDelta = ceil_div(1000 * (startedUsers + 1), lambda)` (§4.3.3). Kept
/// in floating point rather than `ceil_div`'s integer division since
/// `lambda` is itself fractional (e.g. `0.5` users/sec).
pub fn constant_per_sec_next_deadline_ms(started_users: u64, lambda: f64) -> u64 {
    if lambda <= 0.0 {
        return u64::MAX;
    }
    ((1000.0 * (started_users + 1) as f64) / lambda).ceil() as u64
}

/// `required = floor((delta*lambda0 + (lambda1-lambda0)*delta^2/(2*D)) / 1000)`
/// (§4.3.4, closed-form integral per §9: `lambda0*t + (lambda1-lambda0)*t^2/(2D)`).
/// `duration_ms` is `D`, the phase duration driving the ramp.
pub fn ramp_required(delta_ms: u64, lambda0: f64, lambda1: f64, duration_ms: f64) -> u64 {
    let delta = delta_ms as f64;
    let integral = delta * lambda0 + (lambda1 - lambda0) * delta * delta / (2.0 * duration_ms);
    (integral / 1000.0).floor().max(0.0) as u64
}

/// The reference implementation's next-deadline formula uses a mixed
/// linear/denominator term the spec explicitly allows replacing with "an
/// equivalent formulation provided overall emitted count... matches
/// `required` to within ±1" (§4.3.4, §9). We instead invert the quadratic
/// directly: solve for the smallest `delta` at which the cumulative
/// integral crosses `(startedUsers + 1) * 1000`, then nudge for floating
/// rounding until `ramp_required` agrees.
pub fn ramp_next_deadline_ms(
    started_users: u64,
    lambda0: f64,
    lambda1: f64,
    duration_ms: f64,
) -> u64 {
    let target = (started_users + 1) as f64 * 1000.0;
    let a = (lambda1 - lambda0) / (2.0 * duration_ms);
    let b = lambda0;

    let delta = if a.abs() < 1e-9 {
        if b <= 0.0 {
            return u64::MAX;
        }
        target / b
    } else {
        let discriminant = b * b + 4.0 * a * target;
        if discriminant < 0.0 {
            return u64::MAX;
        }
        let sqrt_d = discriminant.sqrt();
        let root = (-b + sqrt_d) / (2.0 * a);
        if root.is_finite() && root >= 0.0 {
            root
        } else {
            (-b - sqrt_d) / (2.0 * a)
        }
    };

    if !delta.is_finite() || delta < 0.0 {
        return u64::MAX;
    }

    let mut delta_ms = delta.ceil() as u64;
    while ramp_required(delta_ms, lambda0, lambda1, duration_ms) < started_users + 1 {
        delta_ms += 1;
    }
    while delta_ms > 0
        && ramp_required(delta_ms - 1, lambda0, lambda1, duration_ms) >= started_users + 1
    {
        delta_ms -= 1;
    }
    delta_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(10, 3), 4);
        assert_eq!(ceil_div(9, 3), 3);
        assert_eq!(ceil_div(0, 3), 0);
    }

    #[test]
    fn constant_per_sec_one_per_second_over_ten_seconds_yields_ten() {
        assert_eq!(constant_per_sec_required(10_000, 1.0), 10);
        assert_eq!(constant_per_sec_required(9_999, 1.0), 9);
    }

    #[test]
    fn constant_per_sec_next_deadline_advances_monotonically() {
        let mut started = 0u64;
        let mut prev_deadline = 0u64;
        for _ in 0..20 {
            let deadline = constant_per_sec_next_deadline_ms(started, 5.0);
            assert!(deadline >= prev_deadline);
            assert_eq!(constant_per_sec_required(deadline, 5.0), started + 1);
            prev_deadline = deadline;
            started += 1;
        }
    }

    #[test]
    fn ramp_zero_to_hundred_over_one_second_yields_about_fifty() {
        let count = ramp_required(1000, 0.0, 100.0, 1000.0);
        assert!((48..=52).contains(&count), "count was {count}");
    }

    #[test]
    fn ramp_flat_rate_matches_constant_formula() {
        // lambda0 == lambda1 degenerates to the constant-rate case.
        for delta in [0, 100, 500, 999, 1000] {
            assert_eq!(
                ramp_required(delta, 3.0, 3.0, 1000.0),
                constant_per_sec_required(delta, 3.0)
            );
        }
    }

    #[test]
    fn ramp_next_deadline_is_self_consistent() {
        let mut started = 0u64;
        for _ in 0..30 {
            let deadline = ramp_next_deadline_ms(started, 0.0, 100.0, 1000.0);
            if deadline == u64::MAX {
                break;
            }
            assert!(ramp_required(deadline, 0.0, 100.0, 1000.0) >= started + 1);
            if deadline > 0 {
                assert!(ramp_required(deadline - 1, 0.0, 100.0, 1000.0) < started + 1);
            }
            started += 1;
        }
    }
}
