use super::gravity::G0;

// ---------------------------------------------------------------------------
// ISA 1976 Standard Atmosphere (sea level to 86 km)
// ---------------------------------------------------------------------------

const R_AIR: f64 = 287.052_87; // specific gas constant for dry air, J/(kg·K)
const GAMMA: f64 = 1.4; // ratio of specific heats

// Sutherland's law for dynamic viscosity of air
const MU_REF: f64 = 1.716e-5; // Pa·s at T_REF
const T_REF: f64 = 273.15; // K
const SUTHERLAND: f64 = 110.4; // K

/// One layer of the standard atmosphere: base altitude (m), base temperature (K),
/// lapse rate (K/m) and base pressure (Pa).
struct Layer {
    base: f64,
    temperature: f64,
    lapse: f64,
    pressure: f64,
}

const LAYERS: [Layer; 7] = [
    Layer { base: 0.0, temperature: 288.15, lapse: -0.0065, pressure: 101_325.0 },
    Layer { base: 11_000.0, temperature: 216.65, lapse: 0.0, pressure: 22_632.1 },
    Layer { base: 20_000.0, temperature: 216.65, lapse: 0.001, pressure: 5_474.89 },
    Layer { base: 32_000.0, temperature: 228.65, lapse: 0.0028, pressure: 868.019 },
    Layer { base: 47_000.0, temperature: 270.65, lapse: 0.0, pressure: 110.906 },
    Layer { base: 51_000.0, temperature: 270.65, lapse: -0.0028, pressure: 66.9389 },
    Layer { base: 71_000.0, temperature: 214.65, lapse: -0.002, pressure: 3.956_42 },
];

const TOP_OF_MODEL: f64 = 86_000.0;

/// Atmospheric properties at a given geometric altitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atmosphere {
    pub density: f64,             // kg/m^3
    pub pressure: f64,            // Pa
    pub temperature: f64,         // K
    pub sound_speed: f64,         // m/s
    pub kinematic_viscosity: f64, // m^2/s
}

/// ISA 1976 standard atmosphere.
///
/// Negative altitudes clamp to sea level; above 86 km pressure decays
/// exponentially at a fixed temperature.
pub fn isa(altitude_m: f64) -> Atmosphere {
    let h = altitude_m.max(0.0);

    let (temperature, pressure) = if h >= TOP_OF_MODEL {
        let p = 0.3734 * (-0.000_15 * (h - TOP_OF_MODEL)).exp();
        (186.87, p.max(0.0))
    } else {
        let layer = LAYERS
            .iter()
            .rev()
            .find(|l| h >= l.base)
            .unwrap_or(&LAYERS[0]);
        layer_state(layer, h)
    };

    let density = if temperature > 0.0 {
        pressure / (R_AIR * temperature)
    } else {
        0.0
    };

    let dynamic_viscosity =
        MU_REF * (temperature / T_REF).powf(1.5) * (T_REF + SUTHERLAND) / (temperature + SUTHERLAND);
    let kinematic_viscosity = if density > 0.0 {
        dynamic_viscosity / density
    } else {
        f64::INFINITY
    };

    Atmosphere {
        density,
        pressure,
        temperature,
        sound_speed: (GAMMA * R_AIR * temperature).sqrt(),
        kinematic_viscosity,
    }
}

fn layer_state(layer: &Layer, h: f64) -> (f64, f64) {
    let dh = h - layer.base;
    if layer.lapse == 0.0 {
        let p = layer.pressure * ((-G0 / (R_AIR * layer.temperature)) * dh).exp();
        (layer.temperature, p)
    } else {
        let t = layer.temperature + layer.lapse * dh;
        let p = layer.pressure * (t / layer.temperature).powf(-G0 / (layer.lapse * R_AIR));
        (t, p)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sea_level_standard_values() {
        let a = isa(0.0);
        assert!((a.temperature - 288.15).abs() < 0.01);
        assert!((a.pressure - 101_325.0).abs() < 1.0);
        assert!((a.density - 1.225).abs() < 0.001);
        assert!((a.sound_speed - 340.29).abs() < 0.1);
    }

    #[test]
    fn sea_level_viscosity() {
        let a = isa(0.0);
        // ~1.46e-5 m^2/s at 15 °C
        assert!((a.kinematic_viscosity - 1.46e-5).abs() < 0.05e-5);
    }

    #[test]
    fn tropopause_11km() {
        let a = isa(11_000.0);
        assert!((a.temperature - 216.65).abs() < 0.5);
        assert!((a.pressure - 22_632.0).abs() < 100.0);
    }

    #[test]
    fn density_monotonically_decreases() {
        let rho_0 = isa(0.0).density;
        let rho_10k = isa(10_000.0).density;
        let rho_50k = isa(50_000.0).density;
        assert!(rho_0 > rho_10k);
        assert!(rho_10k > rho_50k);
        assert!(rho_50k > 0.0);
    }

    #[test]
    fn negative_altitude_clamps_to_sea_level() {
        let a = isa(-500.0);
        assert!((a.temperature - 288.15).abs() < 0.01);
    }

    #[test]
    fn near_vacuum_above_86km() {
        let a = isa(100_000.0);
        assert!(a.density < 1e-5);
        assert!(a.pressure < 1.0);
    }
}
