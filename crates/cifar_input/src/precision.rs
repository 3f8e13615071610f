use serde::Deserialize;
use tch::Kind;

/// Floating point precision of the tensors a pipeline emits.
///
/// `BFloat16` halves host memory and transfer size for accelerators that
/// train in reduced precision; `Float32` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Float32,
    BFloat16,
}

impl Precision {
    /// Picks the precision from the usual `use_bfloat16` flag.
    pub fn from_bfloat16_flag(use_bfloat16: bool) -> Self {
        if use_bfloat16 {
            Self::BFloat16
        } else {
            Self::Float32
        }
    }

    pub fn kind(self) -> Kind {
        match self {
            Self::Float32 => Kind::Float,
            Self::BFloat16 => Kind::BFloat16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_kind() {
        assert_eq!(Precision::default().kind(), Kind::Float);
        assert_eq!(Precision::from_bfloat16_flag(true).kind(), Kind::BFloat16);
        assert_eq!(Precision::from_bfloat16_flag(false), Precision::Float32);
    }
}
