//! Land-point mask: the 2-D to compressed 1-D mapping
//!
//! The routing core never sees 2-D coordinates. Every per-pixel array it
//! consumes or produces is indexed by *land point*: the row-major rank of a
//! cell among the cells that are inside the mask. `LandMask` owns that
//! numbering and converts maps in both directions.

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};

/// Cells of a grid that take part in the simulation.
#[derive(Debug, Clone)]
pub struct LandMask {
    rows: usize,
    cols: usize,
    /// Flat row-major cell index of every land point
    cells: Vec<usize>,
    /// Land-point index of every grid cell, `None` outside the mask
    points: Vec<Option<usize>>,
}

impl LandMask {
    /// Build a mask from a raster: a cell is inside when it is not no-data
    /// and its value is non-zero.
    pub fn from_raster<T: RasterElement>(mask: &Raster<T>) -> Self {
        let (rows, cols) = mask.shape();
        let inside: Vec<bool> = mask
            .data()
            .iter()
            .map(|&v| !mask.is_nodata(v) && v.to_f64().is_some_and(|x| x != 0.0))
            .collect();
        Self::build(rows, cols, &inside)
    }

    /// Build a mask from row-major booleans
    pub fn from_bools(rows: usize, cols: usize, inside: &[bool]) -> Result<Self> {
        if inside.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Ok(Self::build(rows, cols, inside))
    }

    /// Mask covering every cell of a `rows x cols` grid
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::build(rows, cols, &vec![true; rows * cols])
    }

    fn build(rows: usize, cols: usize, inside: &[bool]) -> Self {
        let mut cells = Vec::new();
        let mut points = vec![None; rows * cols];
        for (flat, _) in inside.iter().enumerate().filter(|(_, &keep)| keep) {
            points[flat] = Some(cells.len());
            cells.push(flat);
        }
        Self {
            rows,
            cols,
            cells,
            points,
        }
    }

    /// Number of land points
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Grid dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Land-point index of (row, col); `None` when outside the grid or mask
    pub fn point_index(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.points[row * self.cols + col]
    }

    /// Grid cell (row, col) of a land point
    pub fn cell_of(&self, point: usize) -> (usize, usize) {
        let flat = self.cells[point];
        (flat / self.cols, flat % self.cols)
    }

    /// Iterate over the (row, col) of every land point, in land-point order
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells.iter().map(move |&flat| (flat / self.cols, flat % self.cols))
    }

    /// Extract the land-point values of a map
    pub fn compress<T: RasterElement>(&self, map: &Raster<T>) -> Result<Vec<T>> {
        self.check_shape(map)?;
        let flat = map.data();
        Ok(self
            .cells()
            .map(|(row, col)| flat[(row, col)])
            .collect())
    }

    /// Scatter land-point values back onto a grid, filling cells outside the
    /// mask with `fill` (also set as the no-data value).
    pub fn decompress<T: RasterElement>(&self, values: &[T], fill: T) -> Result<Raster<T>> {
        if values.len() != self.len() {
            return Err(Error::Other(format!(
                "cannot decompress {} values onto a mask of {} land points",
                values.len(),
                self.len()
            )));
        }
        let mut raster = Raster::filled(self.rows, self.cols, fill);
        raster.set_nodata(Some(fill));
        let data = raster.data_mut();
        for ((row, col), &value) in self.cells().zip(values) {
            data[(row, col)] = value;
        }
        Ok(raster)
    }

    fn check_shape<T: RasterElement>(&self, map: &Raster<T>) -> Result<()> {
        let (ar, ac) = map.shape();
        if (ar, ac) != (self.rows, self.cols) {
            return Err(Error::SizeMismatch {
                er: self.rows,
                ec: self.cols,
                ar,
                ac,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mask() -> LandMask {
        // 1 0 1
        // 1 1 0
        let raster = Raster::from_vec(vec![1_u8, 0, 1, 1, 1, 0], 2, 3).unwrap();
        LandMask::from_raster(&raster)
    }

    #[test]
    fn test_point_numbering_is_row_major() {
        let mask = sample_mask();
        assert_eq!(mask.len(), 4);
        assert_eq!(mask.point_index(0, 0), Some(0));
        assert_eq!(mask.point_index(0, 1), None);
        assert_eq!(mask.point_index(0, 2), Some(1));
        assert_eq!(mask.point_index(1, 1), Some(3));
        assert_eq!(mask.point_index(5, 5), None);
        assert_eq!(mask.cell_of(2), (1, 0));
    }

    #[test]
    fn test_compress_decompress() {
        let mask = sample_mask();
        let map = Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();

        let points = mask.compress(&map).unwrap();
        assert_eq!(points, vec![1.0, 3.0, 4.0, 5.0]);

        let back = mask.decompress(&points, -1.0).unwrap();
        assert_eq!(back.get(0, 1).unwrap(), -1.0);
        assert_eq!(back.get(1, 1).unwrap(), 5.0);
        assert_eq!(back.nodata(), Some(-1.0));
    }

    #[test]
    fn test_compress_shape_mismatch() {
        let mask = sample_mask();
        let map: Raster<f64> = Raster::new(3, 3);
        assert!(matches!(
            mask.compress(&map),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_nodata_is_outside() {
        let mut raster = Raster::from_vec(vec![1_i32, -1, 1, 1], 2, 2).unwrap();
        raster.set_nodata(Some(-1));
        let mask = LandMask::from_raster(&raster);
        assert_eq!(mask.len(), 3);
        assert_eq!(mask.point_index(0, 1), None);
    }
}
