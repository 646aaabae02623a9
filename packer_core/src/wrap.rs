use serde::Serialize;

use crate::types::{OptimizedDimensions, WrapSize};

/// How the wrap sheet is sized from the optimized box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapFormula {
    /// `length = h + w`, `width = l + w`.
    #[default]
    HalfPerimeter,
    /// `length = 2h + 2w`, `width = 2l + 2w`.
    FullPerimeter,
}

/// Sheet size for `dims`. Pure.
pub fn wrap_size(dims: &OptimizedDimensions, formula: WrapFormula) -> WrapSize {
    let (l, w, h) = (dims.length, dims.width, dims.height);
    match formula {
        WrapFormula::HalfPerimeter => WrapSize {
            length: h + w,
            width: l + w,
        },
        WrapFormula::FullPerimeter => WrapSize {
            length: 2.0 * h + 2.0 * w,
            width: 2.0 * l + 2.0 * w,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: OptimizedDimensions = OptimizedDimensions {
        length: 10.5,
        width: 8.5,
        height: 5.5,
    };

    #[test]
    fn half_perimeter() {
        let w = wrap_size(&DIMS, WrapFormula::HalfPerimeter);
        assert_eq!(w, WrapSize { length: 14.0, width: 19.0 });
    }

    #[test]
    fn full_perimeter_doubles() {
        let w = wrap_size(&DIMS, WrapFormula::FullPerimeter);
        assert_eq!(w, WrapSize { length: 28.0, width: 38.0 });
    }
}
