use nalgebra::Vector3;

/// Wraps `value` into `[-length / 2, length / 2)`.
///
/// A non-positive `length` marks an unused axis and leaves the value untouched.
#[inline]
pub fn wrap_coordinate(value: f64, length: f64) -> f64 {
    if length <= 0.0 {
        return value;
    }
    let half = 0.5 * length;
    if (-half..half).contains(&value) {
        return value;
    }
    let mut wrapped = value - length * ((value + half) / length).floor();
    if wrapped >= half {
        wrapped -= length;
    }
    if wrapped < -half {
        wrapped = -half;
    }
    wrapped
}

/// Wraps every component of `position` into the periodic box centred on the origin.
pub fn wrap_periodic(extent: &Vector3<f64>, position: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(
        wrap_coordinate(position.x, extent.x),
        wrap_coordinate(position.y, extent.y),
        wrap_coordinate(position.z, extent.z),
    )
}

/// Shortest representative of the displacement `delta` under periodic boundaries.
pub fn nearest_image(extent: &Vector3<f64>, delta: &Vector3<f64>) -> Vector3<f64> {
    let fold = |d: f64, l: f64| if l > 0.0 { d - l * (d / l).round() } else { d };
    Vector3::new(
        fold(delta.x, extent.x),
        fold(delta.y, extent.y),
        fold(delta.z, extent.z),
    )
}

/// Nearest-image vector pointing from `from` to `to`.
#[inline]
pub fn nearest_image_vector(
    extent: &Vector3<f64>,
    from: &Vector3<f64>,
    to: &Vector3<f64>,
) -> Vector3<f64> {
    nearest_image(extent, &(to - from))
}
