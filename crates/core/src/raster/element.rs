//! Cell value trait for rasters

use num_traits::Zero;
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Runnel stores elevations, depths and discharges as `f64` and D8 flow
/// direction codes as `u8`.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + Zero + Send + Sync + 'static
{
    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;
}

impl RasterElement for u8 {
    fn is_nodata(&self, nodata: Option<Self>) -> bool {
        nodata == Some(*self)
    }
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    None => false,
                }
            }
        }
    };
}

impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!((-9999.0_f64).is_nodata(Some(-9999.0)));
        assert!(!1.0_f64.is_nodata(Some(-9999.0)));
    }

    #[test]
    fn test_code_nodata() {
        assert!(255_u8.is_nodata(Some(255)));
        assert!(!0_u8.is_nodata(None));
    }
}
