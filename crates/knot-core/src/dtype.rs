use std::fmt;

// DType: element type of a variable and of the values bound to it
//
// A variable declares its DType up front; any value bound to it, eagerly or
// through a deferred initializer, must carry the same DType.
//
//   F16 - 16-bit IEEE half float
//   F32 - 32-bit float, the default for parameters
//   F64 - 64-bit float
//   I8  - signed byte, quantized weights
//   I16 - signed 16-bit integer

/// Element data type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
    F64,
    I8,
    I16,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I8 => 1,
            DType::I16 => 2,
        }
    }

    /// Whether values of this type can carry gradients.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    /// Lowercase name used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::I16 => "i16",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rust element types that can back a [`DenseValue`](crate::DenseValue).
///
/// Conversions go through f64 so initializers can be written once.
pub trait WithDType: Copy + Send + Sync + 'static + num_traits::NumCast + fmt::Debug {
    const DTYPE: DType;

    fn to_f64(self) -> f64;

    /// Saturating conversion from f64 for the integer types.
    fn from_f64(v: f64) -> Self;
}

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        half::f16::to_f64(self)
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

impl WithDType for f32 {
    const DTYPE: DType = DType::F32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl WithDType for f64 {
    const DTYPE: DType = DType::F64;
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl WithDType for i8 {
    const DTYPE: DType = DType::I8;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        num_traits::cast::<f64, i8>(v.round())
            .unwrap_or(if v < 0.0 { i8::MIN } else { i8::MAX })
    }
}

impl WithDType for i16 {
    const DTYPE: DType = DType::I16;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        num_traits::cast::<f64, i16>(v.round())
            .unwrap_or(if v < 0.0 { i16::MIN } else { i16::MAX })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F64.size_in_bytes(), 8);
        assert_eq!(DType::I8.size_in_bytes(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(DType::F32.to_string(), "f32");
        assert_eq!(DType::I16.to_string(), "i16");
    }

    #[test]
    fn test_integer_saturation() {
        assert_eq!(i8::from_f64(1000.0), i8::MAX);
        assert_eq!(i8::from_f64(-1000.0), i8::MIN);
        assert_eq!(i16::from_f64(2.6), 3);
        assert_eq!(<f32 as WithDType>::DTYPE, DType::F32);
    }

    fn roundtrip<T: WithDType>(v: f64) -> Option<f64> {
        num_traits::cast::<f64, T>(v).map(WithDType::to_f64)
    }

    #[test]
    fn test_f16_through_numcast() {
        assert_eq!(<half::f16 as WithDType>::DTYPE, DType::F16);
        assert_eq!(roundtrip::<half::f16>(0.5), Some(0.5));
        assert_eq!(WithDType::to_f64(half::f16::from_f64(-2.0)), -2.0);
    }
}
