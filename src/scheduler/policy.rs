use std::time::Duration;

use rand::Rng;

use crate::settings::ScheduleSettings;

/// Exclusive upper bound of the next delay: `K × frequency` units when randomized,
/// otherwise the fixed period itself.
pub fn delay_bound(schedule: &ScheduleSettings, frequency_minutes: u32, unit: Duration) -> Duration {
    let periods = if schedule.randomized {
        u64::from(frequency_minutes.max(1)) * u64::from(schedule.multiplier.max(1))
    } else {
        u64::from(frequency_minutes.max(1))
    };
    let nanos = unit.as_nanos().saturating_mul(u128::from(periods));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Draw the delay before the next capture.
///
/// Randomized: uniform in `[0, K × frequency)`. Fixed: exactly `frequency`.
pub fn next_delay<R: Rng + ?Sized>(
    schedule: &ScheduleSettings,
    frequency_minutes: u32,
    unit: Duration,
    rng: &mut R,
) -> Duration {
    let bound = delay_bound(schedule, frequency_minutes, unit);
    if !schedule.randomized {
        return bound;
    }

    let bound_nanos = u64::try_from(bound.as_nanos()).unwrap_or(u64::MAX);
    if bound_nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rng.gen_range(0..bound_nanos))
}
