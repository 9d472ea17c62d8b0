use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Horizontal wind as a function of time and altitude.
///
/// Implementations must be pure: the derivative function samples the wind up
/// to four times per step and expects identical answers for identical inputs.
pub trait WindModel: Send + Sync {
    /// Wind velocity (m/s, ENU) at `time` (s) and geometric `altitude` (m).
    fn velocity(&self, time: f64, altitude: f64) -> Vector3<f64>;
}

/// Unit vector for a wind blowing toward `direction` (azimuth from north, clockwise).
fn heading(direction: f64) -> Vector3<f64> {
    Vector3::new(direction.sin(), direction.cos(), 0.0)
}

// ---------------------------------------------------------------------------
// Constant wind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConstantWind {
    velocity: Vector3<f64>,
}

impl ConstantWind {
    pub fn new(speed: f64, direction: f64) -> Self {
        Self { velocity: heading(direction) * speed }
    }

    pub fn calm() -> Self {
        Self { velocity: Vector3::zeros() }
    }
}

impl WindModel for ConstantWind {
    fn velocity(&self, _time: f64, _altitude: f64) -> Vector3<f64> {
        self.velocity
    }
}

// ---------------------------------------------------------------------------
// Turbulent wind: pre-computed pink noise around the average speed
// ---------------------------------------------------------------------------

/// Spacing between generated turbulence samples, s.
pub const TURBULENCE_INTERVAL: f64 = 0.05;

const MAX_SAMPLES: usize = 2_000_000;

/// Average wind plus pink-noise gusts.
///
/// The whole gust table is generated up front from a seeded generator so
/// lookups are deterministic and free of hidden state.
#[derive(Debug, Clone)]
pub struct PinkNoiseWind {
    average: f64,
    heading: Vector3<f64>,
    samples: Vec<f64>,
}

impl PinkNoiseWind {
    /// `std_dev` is the gust standard deviation (m/s); the table covers `duration` seconds.
    pub fn new(average: f64, std_dev: f64, direction: f64, seed: u64, duration: f64) -> Self {
        let count = ((duration.max(0.0) / TURBULENCE_INTERVAL).ceil() as usize + 2).min(MAX_SAMPLES);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        // Kellett's economy pink filter
        let (mut b0, mut b1, mut b2) = (0.0_f64, 0.0_f64, 0.0_f64);
        let mut raw = Vec::with_capacity(count);
        for _ in 0..count {
            let white: f64 = StandardNormal.sample(&mut rng);
            b0 = 0.997_65 * b0 + white * 0.099_046_0;
            b1 = 0.963_00 * b1 + white * 0.296_516_4;
            b2 = 0.570_00 * b2 + white * 1.052_691_3;
            raw.push(b0 + b1 + b2 + white * 0.184_8);
        }

        let n = raw.len() as f64;
        let mean = raw.iter().sum::<f64>() / n;
        let spread = (raw.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        let scale = if spread > 0.0 { std_dev / spread } else { 0.0 };
        let samples = raw.into_iter().map(|v| (v - mean) * scale).collect();

        Self { average, heading: heading(direction), samples }
    }

    fn gust(&self, time: f64) -> f64 {
        let last = self.samples.len().saturating_sub(1);
        let pos = (time.max(0.0) / TURBULENCE_INTERVAL).min(last as f64);
        let i = pos.floor() as usize;
        let frac = pos - i as f64;
        match (self.samples.get(i), self.samples.get(i + 1)) {
            (Some(a), Some(b)) => a + (b - a) * frac,
            (Some(a), None) => *a,
            _ => 0.0,
        }
    }
}

impl WindModel for PinkNoiseWind {
    fn velocity(&self, time: f64, _altitude: f64) -> Vector3<f64> {
        self.heading * (self.average + self.gust(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_wind_points_downwind() {
        let east = ConstantWind::new(5.0, std::f64::consts::FRAC_PI_2);
        let v = east.velocity(0.0, 0.0);
        assert!((v.x - 5.0).abs() < 1e-12);
        assert!(v.y.abs() < 1e-12);
        assert_eq!(ConstantWind::calm().velocity(3.0, 10.0), Vector3::zeros());
    }

    #[test]
    fn pink_noise_is_reproducible() {
        let a = PinkNoiseWind::new(4.0, 0.4, 0.0, 42, 60.0);
        let b = PinkNoiseWind::new(4.0, 0.4, 0.0, 42, 60.0);
        for i in 0..500 {
            let t = i as f64 * 0.0137;
            assert_eq!(a.velocity(t, 0.0), b.velocity(t, 0.0));
        }
    }

    #[test]
    fn pink_noise_statistics() {
        let w = PinkNoiseWind::new(4.0, 0.4, 0.0, 7, 600.0);
        let speeds: Vec<f64> = w.samples.iter().map(|g| 4.0 + g).collect();
        let n = speeds.len() as f64;
        let mean = speeds.iter().sum::<f64>() / n;
        let sd = (speeds.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!((mean - 4.0).abs() < 1e-9);
        assert!((sd - 0.4).abs() < 1e-9);
    }

    #[test]
    fn pink_noise_interpolates_between_samples() {
        let w = PinkNoiseWind::new(0.0, 1.0, 0.0, 3, 1.0);
        let mid = w.velocity(TURBULENCE_INTERVAL * 0.5, 0.0).y;
        let expected = 0.5 * (w.samples[0] + w.samples[1]);
        assert!((mid - expected).abs() < 1e-12);
    }
}
