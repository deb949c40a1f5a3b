//! Deterministic driving data.

use agrosim_core::{Day, DrivingData, WeatherTable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A mild spring day.
pub fn default_drv() -> DrivingData {
    DrivingData {
        irrad: 15.0e6,
        tmin: 8.0,
        tmax: 20.0,
        vap: 12.0,
        rain: 0.1,
        wind: 2.5,
        e0: 0.35,
        es0: 0.3,
        et0: 0.3,
        temp: None,
        dtemp: None,
    }
}

/// The same record for each of `days` days from `start`.
pub fn constant_weather(start: Day, days: u32, drv: &DrivingData) -> WeatherTable {
    start
        .iter_days()
        .take(days as usize)
        .map(|d| (d, drv.clone()))
        .collect()
}

/// Seasonal weather with seeded noise for `days` days from `start`.
///
/// The same seed always yields the same table.
pub fn synthetic_weather(seed: u64, start: Day, days: u32) -> WeatherTable {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    start
        .iter_days()
        .take(days as usize)
        .enumerate()
        .map(|(i, d)| {
            let season = (i as f64 / 365.0 * std::f64::consts::TAU).sin();
            let tmin = 6.0 + 8.0 * season + rng.random_range(-2.0..2.0);
            let tmax = tmin + rng.random_range(8.0..14.0);
            let rain = if rng.random_bool(0.3) {
                rng.random_range(0.0..1.5)
            } else {
                0.0
            };
            let drv = DrivingData {
                irrad: (12.0 + 8.0 * season + rng.random_range(0.0..4.0)) * 1.0e6,
                tmin,
                tmax,
                vap: rng.random_range(8.0..14.0),
                rain,
                wind: rng.random_range(1.0..4.0),
                e0: rng.random_range(0.2..0.5),
                es0: rng.random_range(0.15..0.4),
                et0: rng.random_range(0.15..0.45),
                temp: None,
                dtemp: None,
            };
            (d, drv)
        })
        .collect()
}
