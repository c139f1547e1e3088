use chrono::NaiveDate;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::collect::catalog::{Raster, RasterBand};
use crate::error::{BiiError, Result};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

/// File extensions read as GeoTIFF
pub const RASTER_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

#[derive(Debug, Default, Deserialize)]
struct GdalMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<GdalItem>,
}

#[derive(Debug, Deserialize)]
struct GdalItem {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@sample", default)]
    sample: Option<usize>,
    #[serde(rename = "$text", default)]
    value: String,
}

/// Band names from GDAL's `DESCRIPTION` items, `b1..bN` where absent
fn band_names(metadata: Option<&str>, count: usize) -> Vec<String> {
    let mut names: Vec<String> = (1..=count).map(|i| format!("b{}", i)).collect();
    let Some(xml) = metadata else {
        return names;
    };
    let parsed: GdalMetadata = match quick_xml::de::from_str(xml) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("ignoring unreadable GDAL metadata: {}", e);
            return names;
        }
    };
    for item in parsed.items {
        if item.name != "DESCRIPTION" || item.value.trim().is_empty() {
            continue;
        }
        if let Some(slot) = item.sample.and_then(|s| names.get_mut(s)) {
            *slot = item.value.trim().to_string();
        }
    }
    names
}

/// Acquisition date from the trailing `YYYYMMDD` digits of a file stem,
/// e.g. `chirps-v2.0.2000.01.31` or `20000131`
pub fn date_from_stem(stem: &str) -> Option<NaiveDate> {
    let digits: String = stem.chars().filter(char::is_ascii_digit).collect();
    let tail = digits.get(digits.len().checked_sub(8)?..)?;
    NaiveDate::parse_from_str(tail, "%Y%m%d").ok()
}

fn samples(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    }
}

/// Read a north-up GeoTIFF into memory.
///
/// The geotransform comes from the pixel-scale and tie-point tags, no-data
/// from `GDAL_NODATA`, band names from `GDAL_METADATA`. Pixel-interleaved
/// samples are split into one band each.
pub fn read_geotiff(id: &str, path: &Path) -> Result<Raster> {
    let tiff_err = |e: tiff::TiffError| {
        BiiError::data_source(id, format!("invalid GeoTIFF {:?}: {}", path, e))
    };

    let file = File::open(path).map_err(|e| BiiError::filesystem(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(tiff_err)?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let (width, height) = (width as usize, height as usize);

    let scale = decoder
        .find_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .map_err(tiff_err)?
        .ok_or_else(|| BiiError::data_source(id, format!("{:?} has no pixel scale", path)))?
        .into_f64_vec()
        .map_err(tiff_err)?;
    let tiepoint = decoder
        .find_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
        .map_err(tiff_err)?
        .ok_or_else(|| BiiError::data_source(id, format!("{:?} has no tie point", path)))?
        .into_f64_vec()
        .map_err(tiff_err)?;
    let (&[scale_x, scale_y, ..], &[i, j, _, x, y, ..]) = (scale.as_slice(), tiepoint.as_slice())
    else {
        return Err(BiiError::data_source(id, format!("{:?} has a malformed geotransform", path)));
    };
    if (scale_x - scale_y).abs() > scale_x.abs() * 1e-9 {
        return Err(BiiError::data_source(
            id,
            format!("{:?} has non-square pixels ({} x {})", path, scale_x, scale_y),
        ));
    }

    let nodata = decoder
        .find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))
        .map_err(tiff_err)?
        .map(|v| v.into_string())
        .transpose()
        .map_err(tiff_err)?
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f64>().ok());
    let metadata = decoder
        .find_tag(Tag::from_u16_exhaustive(GDAL_METADATA))
        .map_err(tiff_err)?
        .map(|v| v.into_string())
        .transpose()
        .map_err(tiff_err)?;

    let values = samples(decoder.read_image().map_err(tiff_err)?);
    let pixels = width
        .checked_mul(height)
        .filter(|&n| n > 0)
        .ok_or_else(|| BiiError::data_source(id, format!("{:?} has no pixels", path)))?;
    if values.len() % pixels != 0 {
        return Err(BiiError::data_source(
            id,
            format!("{:?}: {} samples for {} pixels", path, values.len(), pixels),
        ));
    }
    let count = values.len() / pixels;
    let bands = band_names(metadata.as_deref(), count)
        .into_iter()
        .enumerate()
        .map(|(b, name)| RasterBand {
            name,
            values: values.iter().skip(b).step_by(count).copied().collect(),
        })
        .collect();

    let raster = Raster {
        origin_x: x - i * scale_x,
        origin_y: y + j * scale_y,
        pixel_size: scale_x,
        width,
        height,
        nodata,
        date: path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(date_from_stem),
        bands,
    };
    raster.validate(id)?;
    tracing::debug!(
        dataset = id,
        width,
        height,
        bands = count,
        "read GeoTIFF {}",
        path.display()
    );
    Ok(raster)
}
