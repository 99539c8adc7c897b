//! In-memory Gaussian-splat attribute arrays

use super::{AssetError, AssetResult};

/// Highest number of non-DC spherical-harmonic coefficients per color channel (degree 3)
pub const MAX_SH_COEFFS_PER_CHANNEL: usize = 15;

/// Sign applied to each higher-order coefficient when flipping the Y and Z axes.
///
/// Degree 1 basis functions are (y, z, x), degree 2 (xy, yz, 3z²-1, xz, x²-y²),
/// degree 3 follows the usual real SH ordering.
const RDF_TO_RUB_SH_SIGNS: [f32; MAX_SH_COEFFS_PER_CHANNEL] = [
    -1.0, -1.0, 1.0,
    -1.0, 1.0, 1.0, -1.0, 1.0,
    -1.0, 1.0, -1.0, -1.0, 1.0, -1.0, 1.0,
];

/// How the higher-order coefficients of a loaded cloud are laid out
///
/// `coeffs_per_channel` is the real per-channel stride in `sh_rest`, which may
/// exceed what `degree` evaluates (e.g. 7 coefficients are read as degree 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShLayout {
    /// Highest degree evaluated, -1 when no points are loaded
    pub degree: i32,
    /// Coefficients stored per color channel for each point
    pub coeffs_per_channel: u32,
}

impl ShLayout {
    /// Layout of an empty scene
    pub const EMPTY: Self = Self {
        degree: -1,
        coeffs_per_channel: 0,
    };
}

impl Default for ShLayout {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Six parallel attribute arrays describing one splat scene
///
/// Every array is indexed by the same point index; the number of floats per point
/// is fixed for all of them except `sh_rest`, whose stride determines the
/// spherical-harmonic degree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplatSet {
    /// xyz per point
    pub positions: Vec<f32>,
    /// DC color term (`f_dc_*`), rgb per point
    pub base_color: Vec<f32>,
    /// Higher-order coefficients (`f_rest_*`); per point all red, then green, then blue
    pub sh_rest: Vec<f32>,
    /// Pre-activation opacity, one per point
    pub opacity: Vec<f32>,
    /// Log-scale per axis, xyz per point
    pub scale: Vec<f32>,
    /// Orientation quaternion, w first
    pub rotation: Vec<f32>,
}

impl SplatSet {
    /// Create an empty set with capacity for `points` splats
    pub fn with_capacity(points: usize, sh_coeffs_per_channel: usize) -> Self {
        Self {
            positions: Vec::with_capacity(points * 3),
            base_color: Vec::with_capacity(points * 3),
            sh_rest: Vec::with_capacity(points * sh_coeffs_per_channel * 3),
            opacity: Vec::with_capacity(points),
            scale: Vec::with_capacity(points * 3),
            rotation: Vec::with_capacity(points * 4),
        }
    }

    /// Number of splats
    pub fn len(&self) -> usize {
        self.positions.len() / 3
    }

    /// True when no splats are loaded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Higher-order coefficients stored per color channel for each point
    pub fn sh_coeffs_per_channel(&self) -> usize {
        let points = self.len();
        if points == 0 {
            return 0;
        }
        self.sh_rest.len() / points / 3
    }

    /// Spherical-harmonic degree implied by the coefficient stride
    ///
    /// Returns -1 for an empty set.
    pub fn max_sh_degree(&self) -> i32 {
        if self.is_empty() {
            return -1;
        }
        match self.sh_coeffs_per_channel() {
            c if c >= 15 => 3,
            c if c >= 8 => 2,
            c if c >= 3 => 1,
            _ => 0,
        }
    }

    /// Degree and per-channel stride, as the projection shader reads them
    pub fn sh_layout(&self) -> ShLayout {
        ShLayout {
            degree: self.max_sh_degree(),
            coeffs_per_channel: u32::try_from(self.sh_coeffs_per_channel()).unwrap_or(u32::MAX),
        }
    }

    /// Check that all arrays describe the same number of points
    pub fn validate(&self) -> AssetResult<()> {
        let points = self.len();
        if self.positions.len() % 3 != 0 {
            return Err(AssetError::InconsistentAttribute {
                attribute: "positions",
                expected: points * 3,
                actual: self.positions.len(),
            });
        }
        let fixed = [
            ("base_color", &self.base_color, 3),
            ("opacity", &self.opacity, 1),
            ("scale", &self.scale, 3),
            ("rotation", &self.rotation, 4),
        ];
        for (attribute, values, stride) in fixed {
            if values.len() != points * stride {
                return Err(AssetError::InconsistentAttribute {
                    attribute,
                    expected: points * stride,
                    actual: values.len(),
                });
            }
        }
        let per_point = if points == 0 { 0 } else { self.sh_rest.len() / points };
        if per_point * points != self.sh_rest.len() || per_point % 3 != 0 {
            return Err(AssetError::InconsistentAttribute {
                attribute: "sh_rest",
                expected: points * per_point.next_multiple_of(3),
                actual: self.sh_rest.len(),
            });
        }
        Ok(())
    }

    /// Flip the capture convention (x right, y down, z forward) to x right, y up, z back
    ///
    /// Negates position y/z, quaternion x/y (components 2 and 3 with w first) and the
    /// odd higher-order coefficients. Applying it twice restores the input; nothing
    /// stops a caller from doing so by accident.
    pub fn convert_rdf_to_rub(&mut self) {
        for position in self.positions.chunks_exact_mut(3) {
            position[1] = -position[1];
            position[2] = -position[2];
        }

        for quat in self.rotation.chunks_exact_mut(4) {
            quat[2] = -quat[2];
            quat[3] = -quat[3];
        }

        let per_channel = self.sh_coeffs_per_channel();
        if per_channel == 0 {
            return;
        }
        let flipped = per_channel.min(MAX_SH_COEFFS_PER_CHANNEL);
        for point in self.sh_rest.chunks_exact_mut(per_channel * 3) {
            for channel in point.chunks_exact_mut(per_channel) {
                for (coeff, sign) in channel[..flipped].iter_mut().zip(RDF_TO_RUB_SH_SIGNS) {
                    *coeff *= sign;
                }
            }
        }
    }
}
