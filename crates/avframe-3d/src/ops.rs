use glam::DVec3;

/// Utility function to compute the Euclidean distance between two points.
///
/// Example:
/// ```
/// use avframe_3d::ops::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 5.0, 6.0];
/// let dst = euclidean_distance(&a, &b);
/// assert!((dst - 27f64.sqrt()).abs() < 1e-12);
/// ```
pub fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    DVec3::from_array(*a).distance(DVec3::from_array(*b))
}

/// The mean of a set of points, or `None` if the set is empty.
pub fn centroid(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
    Some((sum / points.len() as f64).to_array())
}

/// The smallest distance from `origin` to any of `points`.
///
/// Returns `f64::INFINITY` for an empty set.
pub fn min_distance_to(points: &[[f64; 3]], origin: &[f64; 3]) -> f64 {
    points
        .iter()
        .map(|p| euclidean_distance(p, origin))
        .fold(f64::INFINITY, f64::min)
}

/// Component-wise minimum and maximum of a set of points.
pub fn bounds(points: &[[f64; 3]]) -> Option<([f64; 3], [f64; 3])> {
    let first = DVec3::from_array(*points.first()?);
    let (min, max) = points.iter().fold((first, first), |(min, max), p| {
        let p = DVec3::from_array(*p);
        (min.min(p), max.max(p))
    });
    Some((min.to_array(), max.to_array()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_relative_eq!(euclidean_distance(&a, &b), 5.196152, epsilon = 1e-6);
    }

    #[test]
    fn test_centroid() {
        assert_eq!(centroid(&[]), None);
        let c = centroid(&[[0.0, 0.0, 0.0], [2.0, 4.0, -6.0]]);
        assert_eq!(c, Some([1.0, 2.0, -3.0]));
    }

    #[test]
    fn test_min_distance_and_bounds() {
        let points = [[3.0, 4.0, 0.0], [0.0, 0.0, -2.0], [10.0, 0.0, 0.0]];
        assert_relative_eq!(min_distance_to(&points, &[0.0; 3]), 2.0);
        assert_eq!(min_distance_to(&[], &[0.0; 3]), f64::INFINITY);
        assert_eq!(
            bounds(&points),
            Some(([0.0, 0.0, -2.0], [10.0, 4.0, 0.0]))
        );
        assert_eq!(bounds(&[]), None);
    }
}
