use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 实数区间, 每一端都可以缺失 (无界), 也可以开或闭.
///
/// 既用于度量的容差, 也用于序列分类的 TR/TE 签名.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval {
    /// 下界. `None` 表示无下界.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub min: Option<f64>,

    /// 上界. `None` 表示无上界.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub max: Option<f64>,

    /// 下界是否为开.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "std::ops::Not::not"))]
    pub min_exclusive: bool,

    /// 上界是否为开.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "std::ops::Not::not"))]
    pub max_exclusive: bool,
}

impl Interval {
    /// 闭区间 `[min, max]`.
    pub const fn closed(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    /// `[min, +inf)`.
    pub const fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    /// `(-inf, max]`.
    pub const fn at_most(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    /// `(-inf, max)`.
    pub const fn below(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
            min_exclusive: false,
            max_exclusive: true,
        }
    }

    /// 整个实数轴.
    pub const fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    /// `v` 是否落在区间内? NaN 永远不在任何区间内.
    pub fn contains(&self, v: f64) -> bool {
        if v.is_nan() {
            return false;
        }
        let lower = match self.min {
            Some(m) if self.min_exclusive => v > m,
            Some(m) => v >= m,
            None => true,
        };
        let upper = match self.max {
            Some(m) if self.max_exclusive => v < m,
            Some(m) => v <= m,
            None => true,
        };
        lower && upper
    }

    /// 区间是否非空 (且端点不是 NaN)?
    pub fn is_valid(&self) -> bool {
        match (self.min, self.max) {
            (Some(a), _) if a.is_nan() => false,
            (_, Some(b)) if b.is_nan() => false,
            (Some(a), Some(b)) if self.min_exclusive || self.max_exclusive => a < b,
            (Some(a), Some(b)) => a <= b,
            _ => true,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = if self.min_exclusive { '(' } else { '[' };
        let hi = if self.max_exclusive { ')' } else { ']' };
        match (self.min, self.max) {
            (Some(a), Some(b)) => write!(f, "{lo}{a}, {b}{hi}"),
            (Some(a), None) => write!(f, "{lo}{a}, +inf)"),
            (None, Some(b)) => write!(f, "(-inf, {b}{hi}"),
            (None, None) => write!(f, "(-inf, +inf)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_bounds() {
        let t = Interval::closed(188.0, 192.0);
        assert!(t.contains(188.0));
        assert!(t.contains(192.0));
        assert!(!t.contains(192.01));
        assert!(!t.contains(f64::NAN));

        let below = Interval::below(300.0);
        assert!(below.contains(299.9));
        assert!(!below.contains(300.0));

        let open = Interval {
            min_exclusive: true,
            ..Interval::closed(-5.0, 5.0)
        };
        assert!(!open.contains(-5.0));
        assert!(open.contains(5.0));
        assert!(Interval::unbounded().contains(-1e300));
    }

    #[test]
    fn test_validity_and_display() {
        assert!(Interval::closed(1.0, 1.0).is_valid());
        assert!(!Interval::closed(2.0, 1.0).is_valid());
        assert!(!Interval::below(f64::NAN).is_valid());
        assert_eq!(Interval::closed(4.3, 5.7).to_string(), "[4.3, 5.7]");
        assert_eq!(Interval::at_least(87.5).to_string(), "[87.5, +inf)");
        assert_eq!(Interval::below(300.0).to_string(), "(-inf, 300)");
    }
}
