//! Membership functions — the tagged variant at the heart of the fuzzy engine.

use serde::{Deserialize, Serialize};

use crate::error::{KtrdrError, Result};

/// A parameterized membership function over the real line, producing values
/// in [0, 1].
///
/// Degenerate shapes (`a == b`, `b == c`) are valid and produce one-sided
/// ramps. NaN input propagates to NaN output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MembershipFn {
    Triangular { a: f64, b: f64, c: f64 },
    Trapezoidal { a: f64, b: f64, c: f64, d: f64 },
    Gaussian { mu: f64, sigma: f64 },
}

impl MembershipFn {
    /// Construct from a config-level (kind, parameter list) pair.
    pub fn from_parts(kind: &str, params: &[f64]) -> Result<Self> {
        let mf = match (kind, params) {
            ("triangular", [a, b, c]) => MembershipFn::Triangular {
                a: *a,
                b: *b,
                c: *c,
            },
            ("trapezoidal", [a, b, c, d]) => MembershipFn::Trapezoidal {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
            },
            ("gaussian", [mu, sigma]) => MembershipFn::Gaussian {
                mu: *mu,
                sigma: *sigma,
            },
            ("triangular" | "trapezoidal" | "gaussian", _) => {
                return Err(KtrdrError::Config(format!(
                    "membership function '{kind}' given {} parameters",
                    params.len()
                )))
            }
            _ => {
                return Err(KtrdrError::Config(format!(
                    "unknown membership function type '{kind}'"
                )))
            }
        };
        mf.validate()?;
        Ok(mf)
    }

    /// Check the parameter invariants: `a <= b <= c (<= d)`, `sigma > 0`,
    /// all parameters finite.
    pub fn validate(&self) -> Result<()> {
        let ok = match *self {
            MembershipFn::Triangular { a, b, c } => {
                a.is_finite() && b.is_finite() && c.is_finite() && a <= b && b <= c
            }
            MembershipFn::Trapezoidal { a, b, c, d } => {
                a.is_finite()
                    && b.is_finite()
                    && c.is_finite()
                    && d.is_finite()
                    && a <= b
                    && b <= c
                    && c <= d
            }
            MembershipFn::Gaussian { mu, sigma } => mu.is_finite() && sigma > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(KtrdrError::Config(format!(
                "invalid membership parameters: {self:?}"
            )))
        }
    }

    /// Membership degree of `x`, in [0, 1]. NaN in → NaN out.
    pub fn evaluate(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let value = match *self {
            MembershipFn::Triangular { a, b, c } => {
                if x == b {
                    1.0
                } else if x <= a || x >= c {
                    0.0
                } else if x < b {
                    (x - a) / (b - a)
                } else {
                    (c - x) / (c - b)
                }
            }
            MembershipFn::Trapezoidal { a, b, c, d } => {
                if (b..=c).contains(&x) {
                    1.0
                } else if x <= a || x >= d {
                    0.0
                } else if x < b {
                    (x - a) / (b - a)
                } else {
                    (d - x) / (d - c)
                }
            }
            MembershipFn::Gaussian { mu, sigma } => {
                let z = (x - mu) / sigma;
                (-0.5 * z * z).exp()
            }
        };
        value.clamp(0.0, 1.0)
    }

    /// Vectorized evaluation over a full indicator series.
    ///
    /// This is the hot path at training time — one dispatch for the whole
    /// series instead of one per bar.
    pub fn evaluate_series(&self, xs: &[f64]) -> Vec<f64> {
        match *self {
            MembershipFn::Triangular { a, b, c } => xs
                .iter()
                .map(|&x| {
                    if x.is_nan() {
                        f64::NAN
                    } else if x == b {
                        1.0
                    } else if x <= a || x >= c {
                        0.0
                    } else if x < b {
                        ((x - a) / (b - a)).clamp(0.0, 1.0)
                    } else {
                        ((c - x) / (c - b)).clamp(0.0, 1.0)
                    }
                })
                .collect(),
            MembershipFn::Trapezoidal { a, b, c, d } => xs
                .iter()
                .map(|&x| {
                    if x.is_nan() {
                        f64::NAN
                    } else if (b..=c).contains(&x) {
                        1.0
                    } else if x <= a || x >= d {
                        0.0
                    } else if x < b {
                        ((x - a) / (b - a)).clamp(0.0, 1.0)
                    } else {
                        ((d - x) / (d - c)).clamp(0.0, 1.0)
                    }
                })
                .collect(),
            MembershipFn::Gaussian { mu, sigma } => xs
                .iter()
                .map(|&x| {
                    if x.is_nan() {
                        f64::NAN
                    } else {
                        let z = (x - mu) / sigma;
                        (-0.5 * z * z).exp().clamp(0.0, 1.0)
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangular_shape() {
        let tri = MembershipFn::Triangular {
            a: 30.0,
            b: 50.0,
            c: 70.0,
        };
        assert_eq!(tri.evaluate(30.0), 0.0);
        assert_eq!(tri.evaluate(50.0), 1.0);
        assert_eq!(tri.evaluate(70.0), 0.0);
        assert!((tri.evaluate(40.0) - 0.5).abs() < 1e-12);
        assert!((tri.evaluate(60.0) - 0.5).abs() < 1e-12);
        assert_eq!(tri.evaluate(0.0), 0.0);
        assert_eq!(tri.evaluate(100.0), 0.0);
    }

    #[test]
    fn triangular_degenerate_left_shoulder() {
        // a == b: one-sided falling ramp, peak at the left edge.
        let tri = MembershipFn::Triangular {
            a: 0.0,
            b: 0.0,
            c: 45.0,
        };
        assert_eq!(tri.evaluate(0.0), 1.0);
        assert_eq!(tri.evaluate(45.0), 0.0);
        assert!((tri.evaluate(22.5) - 0.5).abs() < 1e-12);
        assert_eq!(tri.evaluate(-1.0), 0.0);
    }

    #[test]
    fn triangular_degenerate_right_shoulder() {
        let tri = MembershipFn::Triangular {
            a: 55.0,
            b: 100.0,
            c: 100.0,
        };
        assert_eq!(tri.evaluate(100.0), 1.0);
        assert_eq!(tri.evaluate(55.0), 0.0);
        assert_eq!(tri.evaluate(120.0), 0.0);
    }

    #[test]
    fn trapezoidal_shape() {
        let trap = MembershipFn::Trapezoidal {
            a: 0.0,
            b: 10.0,
            c: 20.0,
            d: 40.0,
        };
        assert_eq!(trap.evaluate(-5.0), 0.0);
        assert!((trap.evaluate(5.0) - 0.5).abs() < 1e-12);
        assert_eq!(trap.evaluate(10.0), 1.0);
        assert_eq!(trap.evaluate(15.0), 1.0);
        assert_eq!(trap.evaluate(20.0), 1.0);
        assert!((trap.evaluate(30.0) - 0.5).abs() < 1e-12);
        assert_eq!(trap.evaluate(40.0), 0.0);
    }

    #[test]
    fn gaussian_shape() {
        let g = MembershipFn::Gaussian {
            mu: 50.0,
            sigma: 10.0,
        };
        assert_eq!(g.evaluate(50.0), 1.0);
        let one_sigma = g.evaluate(60.0);
        assert!((one_sigma - (-0.5_f64).exp()).abs() < 1e-12);
        assert!(g.evaluate(1000.0) < 1e-10);
    }

    #[test]
    fn nan_propagates() {
        for mf in [
            MembershipFn::Triangular {
                a: 0.0,
                b: 1.0,
                c: 2.0,
            },
            MembershipFn::Trapezoidal {
                a: 0.0,
                b: 1.0,
                c: 2.0,
                d: 3.0,
            },
            MembershipFn::Gaussian {
                mu: 0.0,
                sigma: 1.0,
            },
        ] {
            assert!(mf.evaluate(f64::NAN).is_nan());
        }
    }

    #[test]
    fn series_matches_scalar() {
        let mf = MembershipFn::Triangular {
            a: 0.0,
            b: 50.0,
            c: 100.0,
        };
        let xs: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        let batch = mf.evaluate_series(&xs);
        for (i, &x) in xs.iter().enumerate() {
            assert_eq!(batch[i], mf.evaluate(x), "mismatch at x={x}");
        }
    }

    #[test]
    fn from_parts_validates() {
        assert!(MembershipFn::from_parts("triangular", &[0.0, 30.0, 45.0]).is_ok());
        assert!(MembershipFn::from_parts("triangular", &[45.0, 30.0, 0.0]).is_err());
        assert!(MembershipFn::from_parts("triangular", &[0.0, 30.0]).is_err());
        assert!(MembershipFn::from_parts("gaussian", &[0.0, 0.0]).is_err());
        assert!(MembershipFn::from_parts("sigmoid", &[0.0, 1.0]).is_err());
    }

    #[test]
    fn serde_tagged_roundtrip() {
        let mf = MembershipFn::Gaussian {
            mu: 0.0,
            sigma: 2.5,
        };
        let json = serde_json::to_string(&mf).unwrap();
        assert!(json.contains("\"type\":\"gaussian\""));
        let back: MembershipFn = serde_json::from_str(&json).unwrap();
        assert_eq!(mf, back);
    }
}
