//! Axis-aligned bounding box in octree space.

use glam::Vec3;

/// Single-precision axis-aligned bounding box.
///
/// Used both for node regions and for the extent of inserted payloads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb3 {
	/// Minimum corner (inclusive).
	pub min: Vec3,
	/// Maximum corner (inclusive).
	pub max: Vec3,
}

impl Aabb3 {
	/// Create a new AABB from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on all axes.
	pub fn new(min: Vec3, max: Vec3) -> Self {
		debug_assert!(
			min.x <= max.x && min.y <= max.y && min.z <= max.z,
			"AABB min must be <= max on all axes"
		);
		Self { min, max }
	}

	/// Create a cube from its center and edge length.
	pub fn from_center_width(center: Vec3, width: f32) -> Self {
		let half = Vec3::splat(width * 0.5);
		Self {
			min: center - half,
			max: center + half,
		}
	}

	/// Degenerate box holding a single point.
	pub fn from_point(point: Vec3) -> Self {
		Self {
			min: point,
			max: point,
		}
	}

	/// Check if `inner` lies entirely inside this box (boundaries count as inside).
	#[inline]
	pub fn contains_box(&self, inner: &Aabb3) -> bool {
		inner.min.x >= self.min.x
			&& inner.min.y >= self.min.y
			&& inner.min.z >= self.min.z
			&& inner.max.x <= self.max.x
			&& inner.max.y <= self.max.y
			&& inner.max.z <= self.max.z
	}

	/// Check if this AABB contains a point.
	#[inline]
	pub fn contains_point(&self, point: Vec3) -> bool {
		point.x >= self.min.x
			&& point.x <= self.max.x
			&& point.y >= self.min.y
			&& point.y <= self.max.y
			&& point.z >= self.min.z
			&& point.z <= self.max.z
	}

	/// Get the size of the AABB (max - min).
	#[inline]
	pub fn size(&self) -> Vec3 {
		self.max - self.min
	}

	/// Largest edge length.
	///
	/// Octree-space payload boxes are usually cubes, the max keeps the
	/// oversize test honest when they are not.
	#[inline]
	pub fn width(&self) -> f32 {
		self.size().max_element()
	}

	/// Get the center of the AABB.
	#[inline]
	pub fn center(&self) -> Vec3 {
		(self.min + self.max) * 0.5
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_from_center_width() {
		let aabb = Aabb3::from_center_width(Vec3::ZERO, 2.0);
		assert_eq!(aabb.min, Vec3::splat(-1.0));
		assert_eq!(aabb.max, Vec3::splat(1.0));
		assert_eq!(aabb.center(), Vec3::ZERO);
	}

	#[test]
	fn test_contains_box() {
		let outer = Aabb3::new(Vec3::ZERO, Vec3::splat(1.0));

		assert!(outer.contains_box(&Aabb3::new(Vec3::splat(0.25), Vec3::splat(0.75))));
		// Sharing a face still counts
		assert!(outer.contains_box(&Aabb3::new(Vec3::ZERO, Vec3::splat(0.5))));
		assert!(outer.contains_box(&outer));
		// Poking out on one axis
		assert!(!outer.contains_box(&Aabb3::new(
			Vec3::new(0.5, 0.5, 0.5),
			Vec3::new(1.5, 0.75, 0.75)
		)));
	}

	#[test]
	fn test_contains_point() {
		let aabb = Aabb3::new(Vec3::ZERO, Vec3::splat(10.0));

		// Inside
		assert!(aabb.contains_point(Vec3::splat(5.0)));

		// On boundary
		assert!(aabb.contains_point(Vec3::ZERO));
		assert!(aabb.contains_point(Vec3::splat(10.0)));

		// Outside
		assert!(!aabb.contains_point(Vec3::splat(-1.0)));
		assert!(!aabb.contains_point(Vec3::splat(11.0)));
	}

	#[test]
	fn test_width_uses_largest_extent() {
		let aabb = Aabb3::new(Vec3::ZERO, Vec3::new(0.1, 0.4, 0.2));
		assert_eq!(aabb.width(), 0.4);
		assert_eq!(Aabb3::from_point(Vec3::ONE).width(), 0.0);
	}
}
