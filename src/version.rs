//! Container format versioning.
//!
//! Every container header carries a packed `(major, minor, patch)` version.
//! Compatibility is decided component-wise under a [`VersionMask`]: the
//! default mask requires major and minor to match but ignores patch, so
//! patch-level revisions stay forward and backward compatible.

use std::cmp::Ordering;
use std::fmt;

bitflags::bitflags! {
    /// Which version components participate in a compatibility check.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VersionMask: u8 {
        const MAJOR = 1 << 0;
        const MINOR = 1 << 1;
        const PATCH = 1 << 2;
    }
}

impl VersionMask {
    /// Default compatibility mask: major and minor must match, patch is
    /// ignored.
    pub const DEFAULT: Self = Self::MAJOR.union(Self::MINOR);
}

/// A container format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FbomVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// The format version this crate writes.
pub const CURRENT_VERSION: FbomVersion = FbomVersion::new(1, 2, 0);

impl FbomVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Pack into the on-wire `u32`: `(major << 16) | (minor << 8) | patch`.
    pub fn to_u32(self) -> u32 {
        ((self.major as u32) << 16) | ((self.minor as u32) << 8) | self.patch as u32
    }

    /// Unpack from the on-wire `u32`.
    pub fn from_u32(value: u32) -> Self {
        Self {
            major: ((value >> 16) & 0xff) as u8,
            minor: ((value >> 8) & 0xff) as u8,
            patch: (value & 0xff) as u8,
        }
    }

    /// Compare `self` against `other` component-wise under `mask`.
    ///
    /// Returns [`Ordering::Less`] if `self` is older than `other` in the
    /// most significant masked component that differs, `Greater` if newer,
    /// and `Equal` if all masked components match.
    pub fn compare(self, other: Self, mask: VersionMask) -> Ordering {
        if mask.contains(VersionMask::MAJOR) {
            match self.major.cmp(&other.major) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        if mask.contains(VersionMask::MINOR) {
            match self.minor.cmp(&other.minor) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        if mask.contains(VersionMask::PATCH) {
            match self.patch.cmp(&other.patch) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Whether a file written at `self` can be read by a reader at
    /// `other`, under the default mask.
    pub fn is_compatible_with(self, other: Self) -> bool {
        self.compare(other, VersionMask::DEFAULT) == Ordering::Equal
    }
}

impl fmt::Display for FbomVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack() {
        let v = FbomVersion::new(1, 2, 3);
        assert_eq!(v.to_u32(), 0x010203);
        assert_eq!(FbomVersion::from_u32(0x010203), v);
    }

    #[test]
    fn newer_minor_is_greater() {
        let a = FbomVersion::new(1, 9, 0);
        let b = FbomVersion::new(1, 8, 0);
        assert_eq!(a.compare(b, VersionMask::DEFAULT), Ordering::Greater);
        assert_eq!(b.compare(a, VersionMask::DEFAULT), Ordering::Less);
    }

    #[test]
    fn patch_ignored_by_default_mask() {
        let a = FbomVersion::new(1, 9, 1);
        let b = FbomVersion::new(1, 9, 0);
        assert_eq!(a.compare(b, VersionMask::DEFAULT), Ordering::Equal);
        assert!(a.is_compatible_with(b));
    }

    #[test]
    fn patch_respected_when_masked() {
        let a = FbomVersion::new(1, 9, 1);
        let b = FbomVersion::new(1, 9, 0);
        assert_eq!(a.compare(b, VersionMask::all()), Ordering::Greater);
    }

    #[test]
    fn major_dominates() {
        let a = FbomVersion::new(2, 0, 0);
        let b = FbomVersion::new(1, 9, 9);
        assert_eq!(a.compare(b, VersionMask::DEFAULT), Ordering::Greater);
    }
}
