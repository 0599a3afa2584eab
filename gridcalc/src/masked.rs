use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Zip};

use crate::errors::{Error, Result};

/// Value written under masked cells of computed arrays
pub const FILL_VALUE: f64 = 1e20;

/// A float array paired with a same-shaped mask. `true` in the mask marks a missing value.
///
#[derive(Clone, Debug, PartialEq)]
pub struct MaskedArray {
    pub data: ArrayD<f64>,
    pub mask: ArrayD<bool>,
}

impl MaskedArray {
    pub fn new(data: ArrayD<f64>, mask: ArrayD<bool>) -> Result<Self> {
        if data.shape() != mask.shape() {
            return Err(Error::shape_mismatch("mask", data.shape(), mask.shape()));
        }

        Ok(Self { data, mask })
    }

    /// No value masked.
    pub fn from_data(data: ArrayD<f64>) -> Self {
        let mask = ArrayD::from_elem(data.raw_dim(), false);
        Self { data, mask }
    }

    /// Mask every NaN.
    pub fn from_nan(data: ArrayD<f64>) -> Self {
        let mask = data.mapv(f64::is_nan);
        Self { data, mask }
    }

    /// Every value masked.
    pub fn masked(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), FILL_VALUE),
            mask: ArrayD::from_elem(IxDyn(shape), true),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Number of unmasked values
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&masked| !masked).count()
    }

    pub fn all_masked(&self) -> bool {
        self.mask.iter().all(|&masked| masked)
    }

    /// Copy of the data with masked values replaced by `fill`
    pub fn filled(&self, fill: f64) -> ArrayD<f64> {
        let mut data = self.data.clone();
        Zip::from(&mut data)
            .and(&self.mask)
            .for_each(|value, &masked| {
                if masked {
                    *value = fill;
                }
            });

        data
    }

    /// Rows `indices` along `axis`.
    pub fn select(&self, axis: Axis, indices: &[usize]) -> Self {
        Self {
            data: self.data.select(axis, indices),
            mask: self.mask.select(axis, indices),
        }
    }

    /// Mask additionally every value where `mask` is set. `mask` is broadcast to this array's
    /// shape.
    ///
    pub fn mask_where(&mut self, mask: ArrayViewD<bool>) -> Result<()> {
        let shape = self.mask.raw_dim();
        let mask = mask
            .broadcast(shape)
            .ok_or_else(|| Error::shape_mismatch("broadcast mask", self.shape(), mask.shape()))?;
        Zip::from(&mut self.mask)
            .and(&mask)
            .for_each(|masked, &other| *masked = *masked || other);

        Ok(())
    }
}
