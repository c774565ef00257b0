//! Sphere-surface and planar distance math for grid cells.
//!
//! Coordinate convention: x=cos(lat)*cos(lon), y=cos(lat)*sin(lon), z=sin(lat).
//! Bearings are compass degrees (0=N, 90=E, 180=S, 270=W).

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle angular distance between two points on a unit sphere (in radians).
/// Points given as (lat, lon) in degrees.
///
/// Haversine form: keeps precision for neighbouring cells a few km apart.
pub fn angular_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt())
}

/// Great-circle distance in kilometres. Points given as (lat, lon) in degrees.
pub fn great_circle_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    angular_distance(lat1, lon1, lat2, lon2) * EARTH_RADIUS_KM
}

/// Euclidean distance in coordinate units.
pub fn planar_distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    (x2 - x1).hypot(y2 - y1)
}

/// Direction from one point to another on the sphere surface, returned as
/// (east, north) components in a local tangent plane.
/// Points given as (lat, lon) in degrees.
/// Returns (0, 0) for coincident or antipodal points.
pub fn direction_on_sphere(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> (f64, f64) {
    let (x1, y1, z1) = lat_lon_to_xyz(from_lat, from_lon);
    let (x2, y2, z2) = lat_lon_to_xyz(to_lat, to_lon);
    let ((east_x, east_y, east_z), (north_x, north_y, north_z)) =
        tangent_basis(from_lat, from_lon);

    let dx = x2 - x1;
    let dy = y2 - y1;
    let dz = z2 - z1;

    let east_component = dx * east_x + dy * east_y + dz * east_z;
    let north_component = dx * north_x + dy * north_y + dz * north_z;

    let mag = east_component.hypot(north_component);
    if mag < 1e-12 {
        return (0.0, 0.0);
    }

    (east_component / mag, north_component / mag)
}

/// Convert a tangent-plane vector (east, north) to a bearing in degrees (0=N, 90=E, 180=S, 270=W).
pub fn tangent_to_bearing(east: f64, north: f64) -> f64 {
    normalize_bearing(east.atan2(north).to_degrees())
}

/// Unit (east, north) vector for a compass bearing in degrees.
pub fn bearing_to_tangent(bearing: f64) -> (f64, f64) {
    let b = bearing.to_radians();
    (b.sin(), b.cos())
}

/// Wrap any angle in degrees into [0, 360).
pub fn normalize_bearing(bearing: f64) -> f64 {
    let wrapped = bearing.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Wrap a longitude in degrees into [-180, 180).
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Smallest absolute longitude difference in degrees, in [0, 180].
pub fn lon_separation(lon1: f64, lon2: f64) -> f64 {
    normalize_lon(lon2 - lon1).abs()
}

/// Initial compass bearing of the great circle from one point to another.
pub fn initial_bearing(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> Option<f64> {
    let (east, north) = direction_on_sphere(from_lat, from_lon, to_lat, to_lon);
    if east == 0.0 && north == 0.0 {
        None
    } else {
        Some(tangent_to_bearing(east, north))
    }
}

/// Move a point along a great circle by `distance_km` on a compass bearing.
/// Uses Rodrigues' rotation formula. Returns (lat, lon) in degrees, lon in [-180, 180).
pub fn destination(lat: f64, lon: f64, bearing: f64, distance_km: f64) -> (f64, f64) {
    let angle = distance_km / EARTH_RADIUS_KM;
    if angle.abs() < 1e-15 {
        return (lat, lon);
    }

    let (px, py, pz) = lat_lon_to_xyz(lat, lon);
    let ((east_x, east_y, east_z), (north_x, north_y, north_z)) = tangent_basis(lat, lon);
    let (te, tn) = bearing_to_tangent(bearing);

    // Unit direction of travel in 3D
    let vx = te * east_x + tn * north_x;
    let vy = te * east_y + tn * north_y;
    let vz = te * east_z + tn * north_z;

    // Rotation axis k = p × v
    let kx = py * vz - pz * vy;
    let ky = pz * vx - px * vz;
    let kz = px * vy - py * vx;
    let k_mag = (kx * kx + ky * ky + kz * kz).sqrt();
    if k_mag < 1e-12 {
        return (lat, lon);
    }
    let (kx, ky, kz) = (kx / k_mag, ky / k_mag, kz / k_mag);

    let cos_s = angle.cos();
    let sin_s = angle.sin();

    let cross_x = ky * pz - kz * py;
    let cross_y = kz * px - kx * pz;
    let cross_z = kx * py - ky * px;
    let dot = kx * px + ky * py + kz * pz;

    let new_x = px * cos_s + cross_x * sin_s + kx * dot * (1.0 - cos_s);
    let new_y = py * cos_s + cross_y * sin_s + ky * dot * (1.0 - cos_s);
    let new_z = pz * cos_s + cross_z * sin_s + kz * dot * (1.0 - cos_s);

    let (new_lat, new_lon) = xyz_to_lat_lon(new_x, new_y, new_z);
    (new_lat, normalize_lon(new_lon))
}

/// Local (east, north) unit vectors at a point.
///
/// At the poles east is taken along the lon meridian's tangent, so the basis stays finite.
fn tangent_basis(lat: f64, lon: f64) -> ((f64, f64, f64), (f64, f64, f64)) {
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let east = (-lon_rad.sin(), lon_rad.cos(), 0.0);
    let north = (
        -lat_rad.sin() * lon_rad.cos(),
        -lat_rad.sin() * lon_rad.sin(),
        lat_rad.cos(),
    );
    (east, north)
}

/// Convert lat/lon (degrees) to unit sphere coordinates (x, y, z).
pub fn lat_lon_to_xyz(lat: f64, lon: f64) -> (f64, f64, f64) {
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    (
        lat_rad.cos() * lon_rad.cos(),
        lat_rad.cos() * lon_rad.sin(),
        lat_rad.sin(),
    )
}

/// Convert unit sphere coordinates to lat/lon (degrees).
pub fn xyz_to_lat_lon(x: f64, y: f64, z: f64) -> (f64, f64) {
    let lat = z.clamp(-1.0, 1.0).asin().to_degrees();
    let lon = y.atan2(x).to_degrees();
    (lat, lon)
}
