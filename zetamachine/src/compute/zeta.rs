//! Riemann zeta approximation valid over the whole plane except the pole.
//!
//! For `Re(s) < 0` the functional equation reflects the argument into the
//! right half-plane, where Euler–Maclaurin summation converges quickly:
//!
//! ```text
//! ζ(s) = 2 · (2π)^(−s') · cos(πs'/2) · Γ(s') · ζ(s'),   s' = 1 − s
//! ```
//!
//! The reflection factor overflows once `|Im(s)|` grows past [`MAX_GAMMA`],
//! so those points are summed directly instead.

use num_complex::Complex64;
use std::f64::consts::{FRAC_PI_2, TAU};

/// Lower bound on the number of directly summed terms.
const MIN_TERMS: usize = 100;

/// Upper bound on the number of directly summed terms.
const MAX_TERMS: usize = 1_000_000;

/// Largest `|Im(s)|` for which the reflection formula is used.
pub const MAX_GAMMA: f64 = 450.0;

/// `B₂ₖ / (2k)!` for k = 0..20. Index 0 is unused by the correction series.
const BERNOULLI: [f64; 20] = [
    1.0,
    0.083_333_333_333_333_333_333_333_333_333_3,
    -0.001_388_888_888_888_888_888_888_888_888_888_8,
    3.306_878_306_878_306_878_306_878_306_878_3e-5,
    -8.267_195_767_195_767_195_767_195_767_195_8e-7,
    2.087_675_698_786_809_897_921_009_032_120_1e-8,
    -5.284_190_138_687_493_184_847_682_202_179_6e-10,
    1.338_253_653_068_467_883_282_698_097_512_9e-11,
    -3.389_680_296_322_582_866_830_195_391_249_4e-13,
    8.586_062_056_277_844_564_135_905_450_425_6e-15,
    -2.174_868_698_558_061_873_041_516_423_865_9e-16,
    5.509_002_828_360_229_515_202_652_608_902_3e-18,
    -1.395_446_468_581_252_334_070_768_626_406_4e-19,
    3.534_707_039_629_467_471_693_229_977_803_8e-21,
    -8.953_517_426_660_548_087_521_020_753_727_4e-23,
    2.267_952_452_337_683_060_310_950_738_868_2e-24,
    -5.744_790_668_872_202_445_263_881_987_607_0e-26,
    1.455_172_475_614_864_901_866_264_867_271_3e-27,
    -3.685_994_940_665_310_178_181_782_479_908_6e-29,
    9.336_734_257_095_044_672_032_555_152_785_6e-31,
];

/// Lanczos coefficients (g = 607/128, 15 terms).
const LANCZOS: [f64; 15] = [
    0.999_999_999_999_997_091_82,
    57.156_235_665_862_923_517,
    -59.597_960_355_475_491_248,
    14.136_097_974_741_747_174,
    -0.491_913_816_097_620_199_78,
    0.339_946_499_848_118_886_99e-4,
    0.465_236_289_270_485_756_65e-4,
    -0.983_744_753_048_795_646_77e-4,
    0.158_088_703_224_912_488_84e-3,
    -0.210_264_441_724_104_883_19e-3,
    0.217_439_618_115_212_643_20e-3,
    -0.164_318_106_536_763_890_22e-3,
    0.844_182_239_838_527_432_93e-4,
    -0.261_908_384_015_814_086_70e-4,
    0.368_991_826_595_316_227_04e-5,
];

/// Lanczos `g + 1/2`.
const LANCZOS_SHIFT: f64 = 5.242_187_5;

/// Whether [`zeta`] evaluates `s` through the functional equation.
#[inline]
pub fn uses_reflection(s: Complex64) -> bool {
    s.re < 0.0 && s.im.abs() < MAX_GAMMA
}

/// Approximates ζ(s).
pub fn zeta(s: Complex64) -> Complex64 {
    if uses_reflection(s) {
        reflected(s)
    } else {
        euler_maclaurin(s)
    }
}

/// ζ(s) through the functional equation.
fn reflected(s: Complex64) -> Complex64 {
    let s = Complex64::new(1.0, 0.0) - s;
    let factor = gamma(s)
        * 2.0
        * Complex64::new(TAU, 0.0).powc(-s)
        * (s * FRAC_PI_2).cos();
    euler_maclaurin(s) * factor
}

/// Γ(s) by the Lanczos approximation.
pub fn gamma(s: Complex64) -> Complex64 {
    let s = s - 1.0;
    let mut series = Complex64::new(LANCZOS[0], 0.0);
    for (i, &c) in LANCZOS.iter().enumerate().skip(1) {
        series += Complex64::new(c, 0.0) / (s + i as f64);
    }

    let sqrt_tau = TAU.sqrt();
    series * sqrt_tau * (s + LANCZOS_SHIFT).powc(s + 0.5) * (-s - LANCZOS_SHIFT).exp()
}

/// ζ(s) by Euler–Maclaurin summation. Accurate for `Re(s) ≥ 0` and for
/// large `|Im(s)|`; meaningless near the negative real axis.
pub fn euler_maclaurin(s: Complex64) -> Complex64 {
    let n = (s.norm() as usize).clamp(MIN_TERMS, MAX_TERMS);
    let n_f = n as f64;

    let mut z = Complex64::new(0.0, 0.0);
    for k in 1..n {
        z += real_pow(k as f64, -s);
    }

    z += real_pow(n_f, Complex64::new(1.0, 0.0) - s) / (s - 1.0);
    z += real_pow(n_f, -s) * 0.5;

    let mut tail = Complex64::new(0.0, 0.0);
    let mut previous = tail;
    for (k, &b) in BERNOULLI.iter().enumerate().skip(1) {
        let order = 2 * k - 1;
        let exponent = Complex64::new(1.0 - (2 * k) as f64, 0.0) - s;
        tail += pochhammer(s, order) * real_pow(n_f, exponent) * b;

        if (tail - previous).re == 0.0 {
            break;
        }
        previous = tail;
    }

    z + tail
}

/// `a^c` for real positive `a` and complex `c`.
#[inline]
fn real_pow(a: f64, c: Complex64) -> Complex64 {
    let magnitude = a.powf(c.re);
    let phase = c.im * a.ln();
    Complex64::new(magnitude * phase.cos(), magnitude * phase.sin())
}

/// Rising factorial `s (s+1) … (s+n−1)`.
#[inline]
fn pochhammer(s: Complex64, n: usize) -> Complex64 {
    let mut value = Complex64::new(1.0, 0.0);
    for i in 0..n {
        value *= s + i as f64;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn assert_close(actual: Complex64, expected: Complex64, tolerance: f64) {
        assert!(
            (actual - expected).norm() <= tolerance,
            "expected {} got {} (|diff| = {:e})",
            expected,
            actual,
            (actual - expected).norm()
        );
    }

    #[test]
    fn test_zeta_two_is_basel_sum() {
        assert_close(
            zeta(Complex64::new(2.0, 0.0)),
            Complex64::new(PI * PI / 6.0, 0.0),
            1e-12,
        );
    }

    #[test]
    fn test_zeta_three_is_aperys_constant() {
        assert_close(
            zeta(Complex64::new(3.0, 0.0)),
            Complex64::new(1.202_056_903_159_594_2, 0.0),
            1e-12,
        );
    }

    #[test]
    fn test_zeta_minus_one() {
        assert_close(
            zeta(Complex64::new(-1.0, 0.0)),
            Complex64::new(-1.0 / 12.0, 0.0),
            1e-12,
        );
    }

    #[test]
    fn test_zeta_first_nontrivial_zero() {
        let z = zeta(Complex64::new(0.5, 14.134_725_141_734_693));
        assert!(z.norm() < 1e-9, "|ζ| = {:e}", z.norm());
    }

    #[test]
    fn test_trivial_zero_takes_reflection_branch() {
        let s = Complex64::new(-10.0, 0.0);
        assert!(uses_reflection(s));

        let reflected = zeta(s);
        let direct = euler_maclaurin(s);

        assert!(reflected.norm() < 1e-9, "ζ(-10) = {}", reflected);
        assert!((reflected - direct).norm() > 1.0);
    }

    #[test]
    fn test_reflection_only_near_real_axis() {
        assert!(!uses_reflection(Complex64::new(2.0, 0.0)));
        assert!(!uses_reflection(Complex64::new(0.0, 3.0)));
        assert!(uses_reflection(Complex64::new(-0.5, 449.0)));
        assert!(!uses_reflection(Complex64::new(-0.5, -450.0)));
    }

    #[test]
    fn test_gamma_integers() {
        assert_close(gamma(Complex64::new(1.0, 0.0)), Complex64::new(1.0, 0.0), 1e-13);
        assert_close(gamma(Complex64::new(5.0, 0.0)), Complex64::new(24.0, 0.0), 1e-11);
    }

    #[test]
    fn test_gamma_half() {
        assert_close(
            gamma(Complex64::new(0.5, 0.0)),
            Complex64::new(PI.sqrt(), 0.0),
            1e-13,
        );
    }

    #[test]
    fn test_real_pow_matches_powf() {
        let v = real_pow(3.0, Complex64::new(-2.0, 0.0));
        assert_close(v, Complex64::new(1.0 / 9.0, 0.0), 1e-16);
    }

    #[test]
    fn test_pochhammer() {
        let v = pochhammer(Complex64::new(2.0, 0.0), 3);
        assert_eq!(v, Complex64::new(24.0, 0.0));
        assert_eq!(pochhammer(Complex64::new(7.0, 1.0), 0), Complex64::new(1.0, 0.0));
    }
}
