//! sRGB to CIELAB conversion.
//!
//! Pure functions with no state. Distances are squared Euclidean in
//! L*a*b*; the square root is never taken because only ordering matters.

use std::ops::{Add, AddAssign, Mul, Sub};

/// sRGB (D65) to CIE XYZ, rows X, Y, Z.
const SRGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.412_456_4, 0.357_576_1, 0.180_437_5],
    [0.212_672_9, 0.715_152_2, 0.072_175_0],
    [0.019_333_9, 0.119_192_0, 0.950_304_1],
];

/// D65 reference white.
const WHITE: [f64; 3] = [0.950_47, 1.0, 1.088_83];

const DELTA: f64 = 6.0 / 29.0;

/// A color in CIELAB.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    pub const ZERO: Lab = Lab {
        l: 0.0,
        a: 0.0,
        b: 0.0,
    };

    pub fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    /// Squared perceptual distance.
    #[inline]
    pub fn distance_sq(&self, other: &Lab) -> f64 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        dl * dl + da * da + db * db
    }
}

impl Add for Lab {
    type Output = Lab;

    fn add(self, rhs: Lab) -> Lab {
        Lab::new(self.l + rhs.l, self.a + rhs.a, self.b + rhs.b)
    }
}

impl AddAssign for Lab {
    fn add_assign(&mut self, rhs: Lab) {
        self.l += rhs.l;
        self.a += rhs.a;
        self.b += rhs.b;
    }
}

impl Sub for Lab {
    type Output = Lab;

    fn sub(self, rhs: Lab) -> Lab {
        Lab::new(self.l - rhs.l, self.a - rhs.a, self.b - rhs.b)
    }
}

impl Mul<f64> for Lab {
    type Output = Lab;

    fn mul(self, k: f64) -> Lab {
        Lab::new(self.l * k, self.a * k, self.b * k)
    }
}

/// Gamma-expand one encoded channel to linear light in `[0, 1]`.
#[inline]
pub fn srgb_to_linear(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// Convert an encoded 8-bit RGB triple to CIELAB.
pub fn srgb_to_lab(rgb: [u8; 3]) -> Lab {
    let lin = rgb.map(srgb_to_linear);
    let xyz = SRGB_TO_XYZ.map(|row| row[0] * lin[0] + row[1] * lin[1] + row[2] * lin[2]);

    let fx = lab_f(xyz[0] / WHITE[0]);
    let fy = lab_f(xyz[1] / WHITE[1]);
    let fz = lab_f(xyz[2] / WHITE[2]);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}
