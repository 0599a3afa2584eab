use ndarray::{Array2, ArrayD, ArrayViewD, Dimension, IxDyn};

use super::errors::{Error, Result};
use super::helpers::rearrange;

const WKB_LITTLE_ENDIAN: u8 = 1;
const WKB_POINT: u32 = 1;
const WKB_POLYGON: u32 = 3;

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point { x: f64, y: f64 },
    Polygon { exterior: Vec<(f64, f64)> },
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Self::Point { x, y }
    }

    /// Rectangular grid cell. The exterior ring is closed and runs counter clockwise from the
    /// lower left corner.
    ///
    pub fn cell(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        let (left, right) = rearrange(left, right);
        let (bottom, top) = rearrange(bottom, top);
        Self::Polygon {
            exterior: vec![
                (left, bottom),
                (right, bottom),
                (right, top),
                (left, top),
                (left, bottom),
            ],
        }
    }

    /// Canonical byte encoding, little endian well-known binary.
    ///
    /// Two geometries are the same geometry exactly when their encodings are byte for byte
    /// equal.
    ///
    pub fn wkb(&self) -> Vec<u8> {
        let mut buffer = vec![WKB_LITTLE_ENDIAN];
        match self {
            Self::Point { x, y } => {
                buffer.extend_from_slice(&WKB_POINT.to_le_bytes());
                buffer.extend_from_slice(&x.to_le_bytes());
                buffer.extend_from_slice(&y.to_le_bytes());
            }
            Self::Polygon { exterior } => {
                buffer.extend_from_slice(&WKB_POLYGON.to_le_bytes());
                buffer.extend_from_slice(&1_u32.to_le_bytes());
                buffer.extend_from_slice(&(exterior.len() as u32).to_le_bytes());
                for (x, y) in exterior {
                    buffer.extend_from_slice(&x.to_le_bytes());
                    buffer.extend_from_slice(&y.to_le_bytes());
                }
            }
        }

        buffer
    }
}

/// The spatial part of a variable: an array of geometries with a mask marking cells that are
/// outside the area of interest.
///
#[derive(Clone, Debug)]
pub struct SpatialExtent {
    geometries: ArrayD<Geometry>,
    mask: ArrayD<bool>,
}

impl SpatialExtent {
    pub fn new(geometries: ArrayD<Geometry>, mask: Option<ArrayD<bool>>) -> Result<Self> {
        let mask = match mask {
            Some(mask) => {
                if mask.shape() != geometries.shape() {
                    return Err(Error::shape_mismatch(
                        "spatial mask",
                        geometries.shape(),
                        mask.shape(),
                    ));
                }
                mask
            }
            None => ArrayD::from_elem(geometries.raw_dim(), false),
        };

        Ok(Self { geometries, mask })
    }

    /// Grid of cell center points, one row per `y` and one column per `x`.
    ///
    pub fn points(x: &[f64], y: &[f64]) -> Self {
        let geometries =
            Array2::from_shape_fn((y.len(), x.len()), |(row, col)| Geometry::point(x[col], y[row]));
        let mask = ArrayD::from_elem(geometries.raw_dim().into_dyn(), false);

        Self {
            geometries: geometries.into_dyn(),
            mask,
        }
    }

    pub fn empty() -> Self {
        Self {
            geometries: ArrayD::from_elem(IxDyn(&[0, 0]), Geometry::point(0.0, 0.0)),
            mask: ArrayD::from_elem(IxDyn(&[0, 0]), false),
        }
    }

    /// Replace the mask.
    ///
    pub fn with_mask(self, mask: ArrayD<bool>) -> Result<Self> {
        Self::new(self.geometries, Some(mask))
    }

    pub fn shape(&self) -> &[usize] {
        self.geometries.shape()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn geometries(&self) -> ArrayViewD<Geometry> {
        self.geometries.view()
    }

    pub fn mask(&self) -> ArrayViewD<bool> {
        self.mask.view()
    }

    /// Canonical encodings of each cell, in row major order. Masked cells are `None`.
    ///
    pub fn wkb(&self) -> Vec<Option<Vec<u8>>> {
        self.geometries
            .iter()
            .zip(self.mask.iter())
            .map(|(geometry, &masked)| if masked { None } else { Some(geometry.wkb()) })
            .collect()
    }

    /// Distinct canonical encodings of the unmasked cells, in order of first appearance.
    ///
    pub fn distinct_wkb(&self) -> Vec<Vec<u8>> {
        let mut distinct: Vec<Vec<u8>> = vec![];
        for wkb in self.wkb().into_iter().flatten() {
            if !distinct.contains(&wkb) {
                distinct.push(wkb);
            }
        }

        distinct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_point_wkb() {
        let wkb = Geometry::point(1.0, 2.0).wkb();
        assert_eq!(wkb.len(), 21);
        assert_eq!(wkb[0], 1);
        assert_eq!(&wkb[1..5], &[1, 0, 0, 0]);
        assert_eq!(&wkb[5..13], &1.0_f64.to_le_bytes());
    }

    #[test]
    fn test_cell_rearranges() {
        let a = Geometry::cell(0.0, 0.0, 1.0, 1.0);
        let b = Geometry::cell(1.0, 1.0, 0.0, 0.0);
        assert_eq!(a, b);
        assert_eq!(a.wkb(), b.wkb());
        assert_eq!(a.wkb().len(), 1 + 4 + 4 + 4 + 5 * 16);
    }

    #[test]
    fn test_points() {
        let extent = SpatialExtent::points(&[10.0, 20.0, 30.0], &[1.0, 2.0]);
        assert_eq!(extent.shape(), &[2, 3]);
        assert_eq!(extent.geometries()[IxDyn(&[1, 2])], Geometry::point(30.0, 2.0));
        assert!(!extent.mask().iter().any(|&masked| masked));
    }

    #[test]
    fn test_distinct_wkb_skips_masked() -> Result<()> {
        let same = Geometry::point(0.0, 0.0);
        let geometries = arr2(&[
            [same.clone(), Geometry::point(1.0, 0.0)],
            [same.clone(), Geometry::point(2.0, 0.0)],
        ])
        .into_dyn();
        let mask = arr2(&[[false, false], [false, true]]).into_dyn();
        let extent = SpatialExtent::new(geometries, Some(mask))?;

        let distinct = extent.distinct_wkb();
        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0], same.wkb());
        assert_eq!(extent.wkb()[3], None);

        Ok(())
    }

    #[test]
    fn test_mask_shape_checked() {
        let extent = SpatialExtent::points(&[1.0, 2.0], &[1.0]);
        let result = extent.with_mask(ArrayD::from_elem(IxDyn(&[2, 1]), false));
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_empty() {
        let extent = SpatialExtent::empty();
        assert!(extent.is_empty());
        assert!(extent.distinct_wkb().is_empty());
    }
}
