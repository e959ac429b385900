//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{s, Array2, ArrayView2};
use serde::Serialize;

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a row-major grid with the
/// transform, CRS and no-data value that give those cells a location.
///
/// ```ignore
/// use rainband_core::{GeoTransform, Raster, CRS};
///
/// let raster = Raster::from_vec(vec![150.0, 250.0, 350.0, 450.0], 1, 4)?
///     .with_transform(GeoTransform::new(0.0, 1.0, 1.0, -1.0))
///     .with_crs(CRS::conus_albers());
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Cell values, indexed (row, col)
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a raster of another cell type with this raster's georeferencing.
    ///
    /// The no-data value is not carried over since it belongs to the old type.
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Builder-style transform setter
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Builder-style CRS setter
    pub fn with_crs(mut self, crs: CRS) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Builder-style no-data setter
    pub fn with_nodata(mut self, nodata: T) -> Self {
        self.nodata = Some(nodata);
        self
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { row, col, rows, cols }),
        }
    }

    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Copy of the sub-grid `rows x cols` starting at (row0, col0), georeferenced in place
    pub fn window(&self, row0: usize, col0: usize, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 || row0 + rows > self.rows() || col0 + cols > self.cols() {
            return Err(Error::IndexOutOfBounds {
                row: row0 + rows,
                col: col0 + cols,
                rows: self.rows(),
                cols: self.cols(),
            });
        }

        Ok(Self {
            data: self
                .data
                .slice(s![row0..row0 + rows, col0..col0 + cols])
                .to_owned(),
            transform: self.transform.window(col0, row0),
            crs: self.crs.clone(),
            nodata: self.nodata,
        })
    }

    // Metadata

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// No-data value to write into masked cells: the declared one, or the type default
    pub fn nodata_or_default(&self) -> T {
        self.nodata.unwrap_or_else(T::default_nodata)
    }

    /// Absolute cell size as (x, y)
    pub fn resolution(&self) -> (f64, f64) {
        self.transform.resolution()
    }

    /// Map bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    // Coordinate conversion

    /// Map coordinates of the center of pixel (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Fractional pixel coordinates of a map location
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    // Value checks

    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    pub fn is_nodata_at(&self, row: usize, col: usize) -> Result<bool> {
        let value = self.get(row, col)?;
        Ok(self.is_nodata(value))
    }

    /// Number of valid cells holding exactly `value`
    pub fn count_equal(&self, value: T) -> usize {
        self.data
            .iter()
            .filter(|&&v| v == value && !self.is_nodata(v))
            .count()
    }

    // Statistics

    /// Basic statistics over valid cells
    pub fn statistics(&self) -> RasterStatistics {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }
            if let Some(v) = value.to_f64() {
                min = min.min(v);
                max = max.max(v);
                sum += v;
                count += 1;
            }
        }

        let (min, max, mean) = if count > 0 {
            (Some(min), Some(max), Some(sum / count as f64))
        } else {
            (None, None, None)
        };

        RasterStatistics {
            min,
            max,
            mean,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.set(10, 0, 1.0).is_err());
    }

    #[test]
    fn test_from_vec_rejects_bad_shape() {
        let err = Raster::<f64>::from_vec(vec![1.0; 5], 2, 3).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions { width: 3, height: 2 }));
    }

    #[test]
    fn test_raster_statistics_skip_nodata() {
        let mut raster: Raster<f64> = Raster::new(10, 10).with_nodata(-9999.0);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f64).unwrap();
            }
        }
        raster.set(0, 0, -9999.0).unwrap();

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 99);
        assert_eq!(stats.nodata_count, 1);
    }

    #[test]
    fn test_window_keeps_georeference() {
        let raster = Raster::from_vec((0..20).map(|v| v as f64).collect(), 4, 5)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0))
            .with_crs(CRS::conus_albers());

        let sub = raster.window(1, 2, 2, 3).unwrap();
        assert_eq!(sub.shape(), (2, 3));
        assert_eq!(sub.get(0, 0).unwrap(), 7.0);
        assert_eq!(sub.pixel_to_geo(0, 0), raster.pixel_to_geo(2, 1));
        assert_eq!(sub.crs(), raster.crs());
        assert!(raster.window(3, 0, 2, 1).is_err());
    }

    #[test]
    fn test_count_equal() {
        let raster = Raster::from_vec(vec![1, 2, 2, 3, i32::MIN, 2], 2, 3)
            .unwrap()
            .with_nodata(i32::MIN);
        assert_eq!(raster.count_equal(2), 3);
        assert_eq!(raster.count_equal(i32::MIN), 0);
    }
}
