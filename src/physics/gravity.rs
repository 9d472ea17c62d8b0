use nalgebra::Vector3;

pub const G0: f64 = 9.80665; // standard gravity, m/s^2
pub const EARTH_RADIUS: f64 = 6_371_000.0; // mean Earth radius, m

// WGS84 international gravity formula
const G_EQUATOR: f64 = 9.780_326_771_4;
const K_SOMIGLIANA: f64 = 0.001_931_851_386_39;
const E2: f64 = 0.006_694_379_990_13;

/// Sea-level gravity magnitude at a geodetic latitude (rad).
pub fn surface_gravity(latitude: f64) -> f64 {
    let s2 = latitude.sin().powi(2);
    G_EQUATOR * (1.0 + K_SOMIGLIANA * s2) / (1.0 - E2 * s2).sqrt()
}

/// Inverse-square correction of a surface gravity value to `altitude` (m, above sea level).
pub fn at_altitude(surface: f64, altitude: f64) -> f64 {
    let alt = altitude.max(0.0);
    surface * (EARTH_RADIUS / (EARTH_RADIUS + alt)).powi(2)
}

/// Gravitational acceleration vector (ENU, pointing down).
pub fn gravity_accel(surface: f64, altitude: f64) -> Vector3<f64> {
    Vector3::new(0.0, 0.0, -at_altitude(surface, altitude))
}
