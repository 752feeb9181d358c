//! Image stack input and the four output planes.

use crate::error::{Result, SaimError};
use crate::fit::FitResult;
use ndarray::{Array2, Array3, ArrayViewMut2, Axis};
use std::ops::Range;

/// Read-only access to a stack of same-sized slices, one per angle.
///
/// Implementations are read concurrently from every worker.
pub trait ImageStack: Sync {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn slice_count(&self) -> usize;

    /// Value of pixel `(x, y)` in slice `slice`.
    fn sample(&self, x: usize, y: usize, slice: usize) -> f64;

    /// All slice values of pixel `(x, y)`, written into `out`.
    fn pixel_samples(&self, x: usize, y: usize, out: &mut Vec<f64>) {
        out.clear();
        out.extend((0..self.slice_count()).map(|slice| self.sample(x, y, slice)));
    }
}

/// Stacks laid out as `(slice, y, x)`.
impl<T> ImageStack for Array3<T>
where
    T: Copy + Into<f64> + Sync,
{
    fn width(&self) -> usize {
        self.dim().2
    }

    fn height(&self) -> usize {
        self.dim().1
    }

    fn slice_count(&self) -> usize {
        self.dim().0
    }

    fn sample(&self, x: usize, y: usize, slice: usize) -> f64 {
        self[[slice, y, x]].into()
    }
}

/// Fitted height, R², amplitude and background per pixel, indexed `[[y, x]]`.
///
/// Pixels that were never fitted hold 0; pixels whose fit failed hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRaster {
    pub height: Array2<f64>,
    pub r_squared: Array2<f64>,
    pub amplitude: Array2<f64>,
    pub background: Array2<f64>,
}

impl OutputRaster {
    /// Zero-filled planes of `width` × `rows` pixels.
    pub fn new(width: usize, rows: usize) -> Self {
        Self {
            height: Array2::zeros((rows, width)),
            r_squared: Array2::zeros((rows, width)),
            amplitude: Array2::zeros((rows, width)),
            background: Array2::zeros((rows, width)),
        }
    }

    pub fn width(&self) -> usize {
        self.height.ncols()
    }

    pub fn rows(&self) -> usize {
        self.height.nrows()
    }

    /// The four values of pixel `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> FitResult {
        FitResult {
            height: self.height[[y, x]],
            r_squared: self.r_squared[[y, x]],
            amplitude: self.amplitude[[y, x]],
            background: self.background[[y, x]],
        }
    }

    /// Whether every value in column `x` is still 0.
    pub fn column_is_untouched(&self, x: usize) -> bool {
        [&self.height, &self.r_squared, &self.amplitude, &self.background]
            .iter()
            .all(|plane| plane.column(x).iter().all(|&value| value == 0.0))
    }

    /// Split into disjoint mutable views over contiguous column `ranges`.
    ///
    /// The ranges must tile `0..width` in order.
    pub fn split_columns(&mut self, ranges: &[Range<usize>]) -> Result<Vec<RasterColumns<'_>>> {
        let width = self.width();
        let mut expected_start = 0;
        for range in ranges {
            if range.start != expected_start || range.end < range.start {
                return Err(SaimError::InvalidInput(format!(
                    "Column ranges must be contiguous from 0, got {:?} after column {}",
                    range, expected_start
                )));
            }
            expected_start = range.end;
        }
        if expected_start != width {
            return Err(SaimError::InvalidInput(format!(
                "Column ranges cover {} of {} columns",
                expected_start, width
            )));
        }

        let mut rest = RasterColumns {
            first_column: 0,
            height: self.height.view_mut(),
            r_squared: self.r_squared.view_mut(),
            amplitude: self.amplitude.view_mut(),
            background: self.background.view_mut(),
        };
        let mut parts = Vec::with_capacity(ranges.len());
        for range in ranges {
            let (part, tail) = rest.split_at(range.len());
            parts.push(part);
            rest = tail;
        }
        Ok(parts)
    }
}

/// Mutable view of a contiguous column range of an [`OutputRaster`].
#[derive(Debug)]
pub struct RasterColumns<'a> {
    first_column: usize,
    height: ArrayViewMut2<'a, f64>,
    r_squared: ArrayViewMut2<'a, f64>,
    amplitude: ArrayViewMut2<'a, f64>,
    background: ArrayViewMut2<'a, f64>,
}

impl<'a> RasterColumns<'a> {
    fn split_at(self, columns: usize) -> (Self, Self) {
        let (height_left, height_right) = self.height.split_at(Axis(1), columns);
        let (r2_left, r2_right) = self.r_squared.split_at(Axis(1), columns);
        let (a_left, a_right) = self.amplitude.split_at(Axis(1), columns);
        let (b_left, b_right) = self.background.split_at(Axis(1), columns);

        (
            Self {
                first_column: self.first_column,
                height: height_left,
                r_squared: r2_left,
                amplitude: a_left,
                background: b_left,
            },
            Self {
                first_column: self.first_column + columns,
                height: height_right,
                r_squared: r2_right,
                amplitude: a_right,
                background: b_right,
            },
        )
    }

    /// Image columns covered by this view.
    pub fn columns(&self) -> Range<usize> {
        self.first_column..self.first_column + self.height.ncols()
    }

    pub fn rows(&self) -> usize {
        self.height.nrows()
    }

    /// Store `result` at image column `x` and row `y`.
    pub fn write(&mut self, x: usize, y: usize, result: &FitResult) {
        let index = [y, x - self.first_column];
        self.height[index] = result.height;
        self.r_squared[index] = result.r_squared;
        self.amplitude[index] = result.amplitude;
        self.background[index] = result.background;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::FitParameters;

    #[test]
    fn test_array_stack_layout() {
        let stack = Array3::<u16>::from_shape_fn((3, 2, 4), |(s, y, x)| (100 * s + 10 * y + x) as u16);
        assert_eq!(stack.width(), 4);
        assert_eq!(stack.height(), 2);
        assert_eq!(stack.slice_count(), 3);
        assert_eq!(stack.sample(3, 1, 2), 213.0);

        let mut samples = Vec::new();
        stack.pixel_samples(1, 0, &mut samples);
        assert_eq!(samples, vec![1.0, 101.0, 201.0]);
    }

    #[test]
    fn test_split_columns_writes_disjoint_ranges() {
        let mut raster = OutputRaster::new(5, 2);
        {
            let mut parts = raster.split_columns(&[0..2, 2..5]).unwrap();
            assert_eq!(parts[1].columns(), 2..5);

            let result = FitResult::new(FitParameters::new(1.0, 2.0, 3.0), 0.5);
            parts[1].write(4, 1, &result);
            parts[0].write(0, 0, &FitResult::failed());
        }

        assert_eq!(raster.get(4, 1).height, 3.0);
        assert_eq!(raster.get(4, 1).background, 2.0);
        assert!(raster.get(0, 0).is_failed());
        assert!(raster.column_is_untouched(2));
        assert!(!raster.column_is_untouched(4));
    }

    #[test]
    fn test_split_columns_rejects_gaps() {
        let mut raster = OutputRaster::new(5, 1);
        assert!(raster.split_columns(&[0..2, 3..5]).is_err());
        assert!(raster.split_columns(&[0..2]).is_err());
    }
}
