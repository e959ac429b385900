//! GeoTIFF reading and writing with the pure-Rust `tiff` crate.
//!
//! Georeferencing is carried by the standard GeoTIFF tags: pixel scale and
//! tiepoint (or the full model transformation), the GeoKey directory for the
//! EPSG code, and GDAL's ASCII no-data tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use num_traits::NumCast;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const USER_DEFINED: u32 = 32767;

/// Read a GeoTIFF file into a Raster.
///
/// Fails with [`Error::NotFound`] when the path does not exist and
/// [`Error::Format`] when the file is not a decodable single-band TIFF.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let raster = decode_geotiff(BufReader::new(file), path)?;
    debug!(
        "Read {} ({} x {}, crs {:?})",
        path.display(),
        raster.cols(),
        raster.rows(),
        raster.crs().map(|c| c.identifier())
    );
    Ok(raster)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), Path::new("<memory>"))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R, source: &Path) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::format(source, format!("TIFF decode error: {e}")))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::format(source, format!("cannot read dimensions: {e}")))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::format(source, format!("cannot read image data: {e}")))?;

    let float32 = matches!(result, DecodingResult::F32(_));
    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => {
            return Err(Error::format(source, "unsupported TIFF pixel format"));
        }
    };

    if data.len() != rows * cols {
        return Err(Error::format(
            source,
            format!(
                "expected {} samples for {}x{}, found {} (multi-band images are not supported)",
                rows * cols,
                cols,
                rows,
                data.len()
            ),
        ));
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    match read_geotransform(&mut decoder) {
        Some(transform) => raster.set_transform(transform),
        None => debug!("{}: no georeferencing tags, using identity transform", source.display()),
    }
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(read_nodata(&mut decoder, float32));

    Ok(raster)
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, or ModelTransformation
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();

    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    // Row-major 4x4 matrix; only the 2D affine part is used
    let m = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).ok()?;
    if m.len() < 16 {
        return None;
    }
    Some(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u32_vec(Tag::GeoKeyDirectoryTag).ok()?;
    parse_geokeys(&keys)
}

/// EPSG code from a GeoKey directory: header [version, revision, minor, count]
/// followed by `count` entries of [key, location, count, value].
fn parse_geokeys(keys: &[u32]) -> Option<CRS> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;

    let mut projected = None;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        // Non-zero location means the value lives in another tag
        if entry[1] != 0 {
            continue;
        }
        match u16::try_from(entry[0]) {
            Ok(PROJECTED_CS_TYPE_KEY) => projected = Some(entry[3]),
            Ok(GEOGRAPHIC_TYPE_KEY) => geographic = Some(entry[3]),
            _ => {}
        }
    }

    let usable = |code: u32| code != 0 && code != USER_DEFINED;
    projected
        .filter(|&c| usable(c))
        .or(geographic.filter(|&c| usable(c)))
        .map(CRS::from_epsg)
}

/// GDAL no-data text, rounded like the samples when they are Float32
fn read_nodata<R: Read + Seek, T: RasterElement>(
    decoder: &mut Decoder<R>,
    float32: bool,
) -> Option<T> {
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    let value = if float32 { value as f32 as f64 } else { value };
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file (32-bit float samples)
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let tiff_err = |what: &str, e: tiff::TiffError| Error::Other(format!("{what}: {e}"));

    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_err("TIFF encoder error", e))?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| tiff_err("cannot create TIFF image", e))?;

    let gt = raster.transform();
    if gt.row_rotation == 0.0 && gt.col_rotation == 0.0 {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &scale[..])
            .map_err(|e| tiff_err("cannot write scale tag", e))?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
            .map_err(|e| tiff_err("cannot write tiepoint tag", e))?;
    } else {
        let matrix = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image
            .encoder()
            .write_tag(Tag::ModelTransformationTag, &matrix[..])
            .map_err(|e| tiff_err("cannot write transformation tag", e))?;
    }

    let geokeys = build_geokeys(raster.crs());
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
        .map_err(|e| tiff_err("cannot write geokey tag", e))?;

    if let Some(nodata) = raster.nodata().and_then(|nd| num_traits::cast::<T, f32>(nd)) {
        let text = nodata.to_string();
        image
            .encoder()
            .write_tag(Tag::GdalNodata, text.as_str())
            .map_err(|e| tiff_err("cannot write nodata tag", e))?;
    }

    image
        .write_data(&data)
        .map_err(|e| tiff_err("cannot write image data", e))?;

    Ok(())
}

/// GeoKey directory: model type, raster type (PixelIsArea), and the EPSG
/// code when it fits the 16-bit key value.
fn build_geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let geographic = crs.is_some_and(|c| c.is_geographic());
    let model_type = if geographic { 2 } else { 1 };

    let mut entries: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE_KEY, 0, 1, model_type],
        [GT_RASTER_TYPE_KEY, 0, 1, 1],
    ];

    match crs.and_then(|c| c.epsg()).map(u16::try_from) {
        Some(Ok(code)) => {
            let key = if geographic {
                GEOGRAPHIC_TYPE_KEY
            } else {
                PROJECTED_CS_TYPE_KEY
            };
            entries.push([key, 0, 1, code]);
        }
        Some(Err(_)) | None => {
            if let Some(crs) = crs {
                debug!("CRS {} has no 16-bit EPSG code, not written to GeoKeys", crs);
            }
        }
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_raster() -> Raster<f64> {
        let mut raster: Raster<f64> = Raster::new(20, 30)
            .with_transform(GeoTransform::new(-125.0, 50.0, 0.04, -0.04))
            .with_crs(CRS::nad83())
            .with_nodata(-9999.0);
        for i in 0..20 {
            for j in 0..30 {
                raster.set(i, j, (i * 30 + j) as f64).unwrap();
            }
        }
        raster.set(0, 0, -9999.0).unwrap();
        raster
    }

    #[test]
    fn test_write_read_roundtrip() {
        let raster = sample_raster();

        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&raster, tmp.path()).unwrap();

        let loaded: Raster<f64> = read_geotiff(tmp.path()).unwrap();

        assert_eq!(loaded.shape(), raster.shape());
        assert_eq!(loaded.get(10, 15).unwrap(), raster.get(10, 15).unwrap());
        assert_eq!(loaded.nodata(), Some(-9999.0));
        assert!(loaded.is_nodata_at(0, 0).unwrap());
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(4269));

        let gt = loaded.transform();
        assert!((gt.origin_x + 125.0).abs() < 1e-9);
        assert!((gt.origin_y - 50.0).abs() < 1e-9);
        assert!((gt.pixel_width - 0.04).abs() < 1e-12);
        assert!((gt.pixel_height + 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_buffer_roundtrip_projected() {
        let raster = Raster::from_vec(vec![150.0, 250.0, 350.0, 450.0], 1, 4)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, 4000.0, 4000.0, -4000.0))
            .with_crs(CRS::conus_albers());

        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let loaded: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(5070));
        assert_eq!(loaded.nodata(), None);
        assert_eq!(loaded.resolution(), (4000.0, 4000.0));
        assert_eq!(loaded.get(0, 3).unwrap(), 450.0);
    }

    #[test]
    fn test_nan_nodata_roundtrip() {
        let raster = Raster::from_vec(vec![1.0, f64::NAN], 1, 2)
            .unwrap()
            .with_nodata(f64::NAN);
        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let loaded: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();
        assert!(loaded.nodata().is_some_and(|nd| nd.is_nan()));
        assert!(loaded.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_inexact_nodata_roundtrip() {
        for nodata in [-3.4e38, -9999.9] {
            let raster = Raster::from_vec(vec![nodata, 12.5], 1, 2)
                .unwrap()
                .with_transform(GeoTransform::new(5.0, 9.0, 2.0, -2.0))
                .with_crs(CRS::conus_albers())
                .with_nodata(nodata);
            let bytes = write_geotiff_to_buffer(&raster).unwrap();
            let loaded: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

            assert_eq!(loaded.nodata(), Some(nodata as f32 as f64));
            assert!(loaded.is_nodata_at(0, 0).unwrap());
            assert!(!loaded.is_nodata_at(0, 1).unwrap());
        }
    }

    #[test]
    fn test_georeferencing_survives_roundtrip() {
        let raster = Raster::filled(3, 4, 1.0)
            .with_transform(GeoTransform::new(5.0, 9.0, 2.0, -2.0))
            .with_crs(CRS::conus_albers())
            .with_nodata(-9999.0);
        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let loaded: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(*loaded.transform(), GeoTransform::new(5.0, 9.0, 2.0, -2.0));
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(5070));
        assert_eq!(loaded.nodata(), Some(-9999.0));
    }

    #[test]
    fn test_missing_file() {
        let err = read_geotiff::<f64, _>("/definitely/not/here.tif").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_not_a_tiff() {
        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        std::fs::write(tmp.path(), b"this is not a tiff").unwrap();
        let err = read_geotiff::<f64, _>(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_geokeys_parse() {
        let keys: Vec<u32> = build_geokeys(Some(&CRS::conus_albers()))
            .into_iter()
            .map(|k| k as u32)
            .collect();
        assert_eq!(parse_geokeys(&keys).and_then(|c| c.epsg()), Some(5070));

        // user-defined projection carries no usable code
        let user = [1, 1, 0, 1, 3072, 0, 1, 32767];
        assert!(parse_geokeys(&user).is_none());
    }
}
