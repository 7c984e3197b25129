//! GeoTIFF encoding for multi-band Float32 rasters.
//!
//! Writes a little-endian baseline TIFF with one strip per band
//! (PlanarConfiguration = 2), optionally Deflate-compressed, plus the
//! GeoTIFF keys that place the raster on a geographic CRS and the GDAL
//! private tags that carry band names and the nodata value.
//!
//! A matching reader decodes exactly this layout so written artifacts can be
//! checked without a GIS toolchain.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use thiserror::Error;

use forecast_common::ForecastError;

/// Value written for NaN cells and announced through `GDAL_NODATA`.
pub const NODATA_VALUE: f32 = -9999.0;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIG: u16 = 284;
const TAG_EXTRA_SAMPLES: u16 = 338;
const TAG_SAMPLE_FORMAT: u16 = 339;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_METADATA: u16 = 42112;
const TAG_GDAL_NODATA: u16 = 42113;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_DOUBLE: u16 = 12;

const SAMPLE_FORMAT_IEEE_FLOAT: u16 = 3;
const PLANAR_SEPARATE: u16 = 2;
const PHOTOMETRIC_BLACK_IS_ZERO: u16 = 1;

const GEO_KEY_MODEL_TYPE: u16 = 1024;
const GEO_KEY_RASTER_TYPE: u16 = 1025;
const GEO_KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Errors raised while encoding or decoding GeoTIFF bytes.
#[derive(Debug, Error)]
pub enum GeoTiffError {
    #[error("Raster has no bands")]
    NoBands,

    #[error("Invalid raster dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Band {band} has {actual} values, expected {expected}")]
    BandSize {
        band: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Unsupported TIFF layout: {0}")]
    Unsupported(String),

    #[error("Corrupt TIFF: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for GeoTiffError {
    fn from(err: std::io::Error) -> Self {
        GeoTiffError::Compression(err.to_string())
    }
}

impl From<GeoTiffError> for ForecastError {
    fn from(err: GeoTiffError) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}

/// Strip compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TiffCompression {
    None,
    #[default]
    Deflate,
}

impl TiffCompression {
    fn tag_value(&self) -> u16 {
        match self {
            TiffCompression::None => 1,
            TiffCompression::Deflate => 8,
        }
    }
}

/// Affine placement of a north-up raster.
///
/// `origin_x`/`origin_y` is the outer corner of the top-left pixel, so a
/// pixel-centre grid starting at `lon_min` has `origin_x = lon_min - dx/2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from ascending pixel-centre axes.
    ///
    /// An axis with a single coordinate has no spacing of its own and uses
    /// `fallback_step` instead. Returns `None` for empty axes.
    pub fn from_axes(lats: &[f64], lons: &[f64], fallback_step: f64) -> Option<Self> {
        let dx = axis_step(lons, fallback_step)?;
        let dy = axis_step(lats, fallback_step)?;
        let lon_min = *lons.first()?;
        let lat_max = *lats.last()?;
        Some(Self {
            origin_x: lon_min - dx / 2.0,
            origin_y: lat_max + dy / 2.0,
            pixel_width: dx,
            pixel_height: dy,
        })
    }

    /// GDAL-ordered coefficients `[x0, dx, 0, y0, 0, -dy]`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            -self.pixel_height,
        ]
    }

    /// Centre of a pixel as `(lon, lat)`; row 0 is the northernmost row.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }
}

fn axis_step(axis: &[f64], fallback: f64) -> Option<f64> {
    match axis.len() {
        0 => None,
        1 => Some(fallback),
        n => Some((axis[n - 1] - axis[0]) / (n - 1) as f64),
    }
}

/// One band: a description and north-up row-major samples.
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub description: String,
    pub values: Vec<f32>,
}

/// Builder for GeoTIFF bytes.
#[derive(Debug, Clone)]
pub struct GeoTiffWriter {
    width: usize,
    height: usize,
    transform: GeoTransform,
    epsg: u16,
    nodata: f32,
    compression: TiffCompression,
    metadata: BTreeMap<String, String>,
}

impl GeoTiffWriter {
    pub fn new(width: usize, height: usize, transform: GeoTransform) -> Self {
        Self {
            width,
            height,
            transform,
            epsg: 4326,
            nodata: NODATA_VALUE,
            compression: TiffCompression::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn epsg(mut self, epsg: u16) -> Self {
        self.epsg = epsg;
        self
    }

    pub fn nodata(mut self, nodata: f32) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Dataset-level GDAL metadata item.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Encode the bands into a complete GeoTIFF file.
    pub fn encode(&self, bands: &[RasterBand]) -> Result<Vec<u8>, GeoTiffError> {
        if bands.is_empty() {
            return Err(GeoTiffError::NoBands);
        }
        if self.width == 0 || self.height == 0 {
            return Err(GeoTiffError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.width * self.height;
        for (band, b) in bands.iter().enumerate() {
            if b.values.len() != expected {
                return Err(GeoTiffError::BandSize {
                    band,
                    expected,
                    actual: b.values.len(),
                });
            }
        }

        let strips = bands
            .iter()
            .map(|b| self.encode_strip(&b.values))
            .collect::<Result<Vec<_>, _>>()?;

        let n = bands.len();
        let mut fields: BTreeMap<u16, Field> = BTreeMap::new();
        fields.insert(TAG_IMAGE_WIDTH, Field::longs(&[self.width as u32]));
        fields.insert(TAG_IMAGE_LENGTH, Field::longs(&[self.height as u32]));
        fields.insert(TAG_BITS_PER_SAMPLE, Field::shorts(&vec![32; n]));
        fields.insert(TAG_COMPRESSION, Field::shorts(&[self.compression.tag_value()]));
        fields.insert(TAG_PHOTOMETRIC, Field::shorts(&[PHOTOMETRIC_BLACK_IS_ZERO]));
        // Placeholder, patched once the strip positions are known
        fields.insert(TAG_STRIP_OFFSETS, Field::longs(&vec![0; n]));
        fields.insert(TAG_SAMPLES_PER_PIXEL, Field::shorts(&[n as u16]));
        fields.insert(TAG_ROWS_PER_STRIP, Field::longs(&[self.height as u32]));
        let counts: Vec<u32> = strips.iter().map(|s| s.len() as u32).collect();
        fields.insert(TAG_STRIP_BYTE_COUNTS, Field::longs(&counts));
        fields.insert(TAG_PLANAR_CONFIG, Field::shorts(&[PLANAR_SEPARATE]));
        if n > 1 {
            fields.insert(TAG_EXTRA_SAMPLES, Field::shorts(&vec![0; n - 1]));
        }
        fields.insert(TAG_SAMPLE_FORMAT, Field::shorts(&vec![SAMPLE_FORMAT_IEEE_FLOAT; n]));
        fields.insert(
            TAG_MODEL_PIXEL_SCALE,
            Field::doubles(&[self.transform.pixel_width, self.transform.pixel_height, 0.0]),
        );
        fields.insert(
            TAG_MODEL_TIEPOINT,
            Field::doubles(&[0.0, 0.0, 0.0, self.transform.origin_x, self.transform.origin_y, 0.0]),
        );
        fields.insert(
            TAG_GEO_KEY_DIRECTORY,
            Field::shorts(&[
                1, 1, 0, 3,
                GEO_KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC,
                GEO_KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
                GEO_KEY_GEOGRAPHIC_TYPE, 0, 1, self.epsg,
            ]),
        );
        fields.insert(TAG_GDAL_METADATA, Field::ascii(&self.gdal_metadata(bands)));
        fields.insert(TAG_GDAL_NODATA, Field::ascii(&format!("{}", self.nodata)));

        // Header, then the IFD, then out-of-line field values, then strips
        let ifd_offset = 8usize;
        let ifd_len = 2 + 12 * fields.len() + 4;
        let mut cursor = ifd_offset + ifd_len;
        let mut value_offsets: BTreeMap<u16, u32> = BTreeMap::new();
        for (tag, field) in &fields {
            if field.data.len() > 4 {
                cursor = word_align(cursor);
                value_offsets.insert(*tag, cursor as u32);
                cursor += field.data.len();
            }
        }

        let mut strip_offsets = Vec::with_capacity(n);
        for strip in &strips {
            cursor = word_align(cursor);
            strip_offsets.push(cursor as u32);
            cursor += strip.len();
        }
        fields.insert(TAG_STRIP_OFFSETS, Field::longs(&strip_offsets));

        let mut out = Vec::with_capacity(cursor);
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());

        out.extend_from_slice(&(fields.len() as u16).to_le_bytes());
        for (tag, field) in &fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field.field_type.to_le_bytes());
            out.extend_from_slice(&field.count.to_le_bytes());
            match value_offsets.get(tag) {
                Some(offset) => out.extend_from_slice(&offset.to_le_bytes()),
                None => {
                    let mut inline = [0u8; 4];
                    inline[..field.data.len()].copy_from_slice(&field.data);
                    out.extend_from_slice(&inline);
                }
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());

        for (tag, field) in &fields {
            if let Some(&offset) = value_offsets.get(tag) {
                pad_to(&mut out, offset as usize);
                out.extend_from_slice(&field.data);
            }
        }
        for (strip, &offset) in strips.iter().zip(&strip_offsets) {
            pad_to(&mut out, offset as usize);
            out.extend_from_slice(strip);
        }

        Ok(out)
    }

    fn encode_strip(&self, values: &[f32]) -> Result<Vec<u8>, GeoTiffError> {
        let mut raw = Vec::with_capacity(values.len() * 4);
        for &v in values {
            let v = if v.is_nan() { self.nodata } else { v };
            raw.extend_from_slice(&v.to_le_bytes());
        }

        match self.compression {
            TiffCompression::None => Ok(raw),
            TiffCompression::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&raw)?;
                Ok(encoder.finish()?)
            }
        }
    }

    fn gdal_metadata(&self, bands: &[RasterBand]) -> String {
        let mut xml = String::from("<GDALMetadata>\n");
        for (key, value) in &self.metadata {
            xml.push_str(&format!(
                "  <Item name=\"{}\">{}</Item>\n",
                escape_xml(key),
                escape_xml(value)
            ));
        }
        for (idx, band) in bands.iter().enumerate() {
            xml.push_str(&format!(
                "  <Item name=\"DESCRIPTION\" sample=\"{}\" role=\"description\">{}</Item>\n",
                idx,
                escape_xml(&band.description)
            ));
        }
        xml.push_str("</GDALMetadata>");
        xml
    }
}

/// Encoded IFD field value.
#[derive(Debug, Clone)]
struct Field {
    field_type: u16,
    count: u32,
    data: Vec<u8>,
}

impl Field {
    fn shorts(values: &[u16]) -> Self {
        Self {
            field_type: TYPE_SHORT,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn longs(values: &[u32]) -> Self {
        Self {
            field_type: TYPE_LONG,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn doubles(values: &[f64]) -> Self {
        Self {
            field_type: TYPE_DOUBLE,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn ascii(text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self {
            field_type: TYPE_ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn as_u32s(&self) -> Vec<u32> {
        match self.field_type {
            TYPE_SHORT => self
                .data
                .chunks_exact(2)
                .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            TYPE_LONG => self
                .data
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn as_f64s(&self) -> Vec<f64> {
        if self.field_type != TYPE_DOUBLE {
            return Vec::new();
        }
        self.data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect()
    }

    fn as_ascii(&self) -> String {
        String::from_utf8_lossy(&self.data)
            .trim_end_matches('\0')
            .to_string()
    }
}

fn word_align(offset: usize) -> usize {
    offset + (offset & 1)
}

fn pad_to(out: &mut Vec<u8>, offset: usize) {
    while out.len() < offset {
        out.push(0);
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// A decoded GeoTIFF as written by [`GeoTiffWriter`].
#[derive(Debug, Clone)]
pub struct GeoTiffImage {
    pub width: usize,
    pub height: usize,
    pub compression: u16,
    /// Tags present in the IFD, in file order
    pub tags: Vec<u16>,
    pub epsg: Option<u16>,
    pub transform: Option<GeoTransform>,
    pub nodata: Option<f32>,
    /// Dataset-level GDAL metadata items
    pub metadata: BTreeMap<String, String>,
    /// Band descriptions in band order
    pub descriptions: Vec<String>,
    /// North-up row-major samples per band, nodata left as written
    pub bands: Vec<Vec<f32>>,
}

impl GeoTiffImage {
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }
}

/// Decode a little-endian, planar, single-strip-per-band Float32 GeoTIFF.
pub fn decode_geotiff(bytes: &[u8]) -> Result<GeoTiffImage, GeoTiffError> {
    if bytes.get(0..2) != Some(b"II".as_slice()) {
        return Err(GeoTiffError::Unsupported("only little-endian TIFF is supported".into()));
    }
    if read_u16(bytes, 2)? != 42 {
        return Err(GeoTiffError::Corrupt("bad TIFF magic".into()));
    }

    let ifd = read_u32(bytes, 4)? as usize;
    let entry_count = read_u16(bytes, ifd)? as usize;
    let mut tags = Vec::with_capacity(entry_count);
    let mut fields: BTreeMap<u16, Field> = BTreeMap::new();

    for i in 0..entry_count {
        let entry = ifd + 2 + 12 * i;
        let tag = read_u16(bytes, entry)?;
        let field_type = read_u16(bytes, entry + 2)?;
        let count = read_u32(bytes, entry + 4)?;
        let size = match field_type {
            TYPE_ASCII => 1,
            TYPE_SHORT => 2,
            TYPE_LONG => 4,
            TYPE_DOUBLE => 8,
            other => {
                return Err(GeoTiffError::Unsupported(format!(
                    "field type {} on tag {}",
                    other, tag
                )))
            }
        };
        let len = size * count as usize;
        let start = if len <= 4 {
            entry + 8
        } else {
            read_u32(bytes, entry + 8)? as usize
        };
        let data = slice(bytes, start, len)?.to_vec();

        tags.push(tag);
        fields.insert(
            tag,
            Field {
                field_type,
                count,
                data,
            },
        );
    }

    let first = |tag: u16| -> Option<u32> { fields.get(&tag)?.as_u32s().first().copied() };

    let width = first(TAG_IMAGE_WIDTH).ok_or_else(|| GeoTiffError::Corrupt("missing width".into()))?
        as usize;
    let height = first(TAG_IMAGE_LENGTH)
        .ok_or_else(|| GeoTiffError::Corrupt("missing height".into()))? as usize;
    let compression = first(TAG_COMPRESSION).unwrap_or(1) as u16;
    let samples = first(TAG_SAMPLES_PER_PIXEL).unwrap_or(1) as usize;

    if samples > 1 && first(TAG_PLANAR_CONFIG) != Some(u32::from(PLANAR_SEPARATE)) {
        return Err(GeoTiffError::Unsupported("interleaved samples".into()));
    }
    if first(TAG_SAMPLE_FORMAT) != Some(u32::from(SAMPLE_FORMAT_IEEE_FLOAT)) {
        return Err(GeoTiffError::Unsupported("sample format is not IEEE float".into()));
    }

    let offsets = fields
        .get(&TAG_STRIP_OFFSETS)
        .map(Field::as_u32s)
        .unwrap_or_default();
    let counts = fields
        .get(&TAG_STRIP_BYTE_COUNTS)
        .map(Field::as_u32s)
        .unwrap_or_default();
    if offsets.len() != samples || counts.len() != samples {
        return Err(GeoTiffError::Unsupported(format!(
            "expected one strip per band, got {} offsets for {} bands",
            offsets.len(),
            samples
        )));
    }

    let mut bands = Vec::with_capacity(samples);
    for (&offset, &count) in offsets.iter().zip(&counts) {
        let strip = slice(bytes, offset as usize, count as usize)?;
        let raw = match compression {
            1 => strip.to_vec(),
            8 => {
                let mut decoded = Vec::with_capacity(width * height * 4);
                ZlibDecoder::new(strip)
                    .read_to_end(&mut decoded)
                    .map_err(|e| GeoTiffError::Corrupt(format!("inflate failed: {}", e)))?;
                decoded
            }
            other => {
                return Err(GeoTiffError::Unsupported(format!("compression {}", other)));
            }
        };
        if raw.len() != width * height * 4 {
            return Err(GeoTiffError::Corrupt(format!(
                "strip holds {} bytes, expected {}",
                raw.len(),
                width * height * 4
            )));
        }
        bands.push(
            raw.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        );
    }

    let epsg = fields.get(&TAG_GEO_KEY_DIRECTORY).and_then(|f| {
        let keys = f.as_u32s();
        keys.get(4..)?
            .chunks_exact(4)
            .find(|k| k[0] == u32::from(GEO_KEY_GEOGRAPHIC_TYPE))
            .map(|k| k[3] as u16)
    });

    let transform = match (
        fields.get(&TAG_MODEL_PIXEL_SCALE).map(Field::as_f64s),
        fields.get(&TAG_MODEL_TIEPOINT).map(Field::as_f64s),
    ) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => Some(GeoTransform {
            origin_x: tie[3],
            origin_y: tie[4],
            pixel_width: scale[0],
            pixel_height: scale[1],
        }),
        _ => None,
    };

    let nodata = fields
        .get(&TAG_GDAL_NODATA)
        .and_then(|f| f.as_ascii().trim().parse::<f32>().ok());

    let mut metadata = BTreeMap::new();
    let mut descriptions = vec![String::new(); samples];
    if let Some(xml) = fields.get(&TAG_GDAL_METADATA).map(Field::as_ascii) {
        for (attrs, text) in parse_metadata_items(&xml) {
            match attrs.get("sample").and_then(|s| s.parse::<usize>().ok()) {
                Some(sample) if attrs.get("role").map(String::as_str) == Some("description") => {
                    if let Some(slot) = descriptions.get_mut(sample) {
                        *slot = text;
                    }
                }
                Some(_) => {}
                None => {
                    if let Some(name) = attrs.get("name") {
                        metadata.insert(name.clone(), text);
                    }
                }
            }
        }
    }

    Ok(GeoTiffImage {
        width,
        height,
        compression,
        tags,
        epsg,
        transform,
        nodata,
        metadata,
        descriptions,
        bands,
    })
}

/// `<Item k="v" ...>text</Item>` entries of a GDAL metadata document.
fn parse_metadata_items(xml: &str) -> Vec<(BTreeMap<String, String>, String)> {
    let mut items = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<Item") {
        rest = &rest[start + "<Item".len()..];
        let Some(tag_end) = rest.find('>') else { break };
        let attr_text = &rest[..tag_end];
        rest = &rest[tag_end + 1..];
        let Some(close) = rest.find("</Item>") else { break };
        let text = unescape_xml(&rest[..close]);
        rest = &rest[close + "</Item>".len()..];

        let parts: Vec<&str> = attr_text.split('"').collect();
        let attrs = parts
            .chunks_exact(2)
            .map(|kv| {
                (
                    kv[0].trim().trim_end_matches('=').to_string(),
                    unescape_xml(kv[1]),
                )
            })
            .collect();
        items.push((attrs, text));
    }
    items
}

fn slice(bytes: &[u8], start: usize, len: usize) -> Result<&[u8], GeoTiffError> {
    bytes
        .get(start..start + len)
        .ok_or_else(|| GeoTiffError::Corrupt(format!("range {}..{} out of bounds", start, start + len)))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, GeoTiffError> {
    let b = slice(bytes, at, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, GeoTiffError> {
    let b = slice(bytes, at, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> GeoTransform {
        GeoTransform::from_axes(&[45.0, 45.5, 46.0], &[9.0, 9.5], 0.01).unwrap()
    }

    fn band(description: &str, values: Vec<f32>) -> RasterBand {
        RasterBand {
            description: description.to_string(),
            values,
        }
    }

    #[test]
    fn test_transform_from_axes() {
        let t = transform();
        assert!((t.pixel_width - 0.5).abs() < 1e-12);
        assert!((t.pixel_height - 0.5).abs() < 1e-12);
        assert!((t.origin_x - 8.75).abs() < 1e-12);
        assert!((t.origin_y - 46.25).abs() < 1e-12);
        assert_eq!(t.to_gdal(), [8.75, 0.5, 0.0, 46.25, 0.0, -0.5]);

        let (lon, lat) = t.pixel_center(0, 0);
        assert!((lon - 9.0).abs() < 1e-12);
        assert!((lat - 46.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_single_point_uses_fallback() {
        let t = GeoTransform::from_axes(&[45.0], &[9.0], 0.01).unwrap();
        assert!((t.pixel_width - 0.01).abs() < 1e-12);
        assert!((t.origin_x - 8.995).abs() < 1e-12);
        assert!(GeoTransform::from_axes(&[], &[9.0], 0.01).is_none());
    }

    #[test]
    fn test_encode_decode_layout() {
        let bytes = GeoTiffWriter::new(2, 3, transform())
            .metadata("VARIABLE", "temperature")
            .encode(&[
                band("2026-01-27T01:00:00", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
                band("2026-01-27T02:00:00", vec![f32::NAN; 6]),
            ])
            .unwrap();

        assert_eq!(&bytes[0..4], &[b'I', b'I', 42, 0]);

        let image = decode_geotiff(&bytes).unwrap();
        assert_eq!((image.width, image.height), (2, 3));
        assert_eq!(image.compression, 8);
        assert_eq!(image.epsg, Some(4326));
        assert_eq!(image.nodata, Some(-9999.0));
        assert_eq!(image.transform, Some(transform()));
        assert_eq!(
            image.descriptions,
            vec!["2026-01-27T01:00:00", "2026-01-27T02:00:00"]
        );
        assert_eq!(image.metadata.get("VARIABLE").map(String::as_str), Some("temperature"));
        assert_eq!(image.bands[0], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(image.bands[1].iter().all(|&v| v == NODATA_VALUE));
    }

    #[test]
    fn test_tags_are_sorted() {
        let bytes = GeoTiffWriter::new(1, 1, transform())
            .encode(&[band("a", vec![0.0]), band("b", vec![1.0]), band("c", vec![2.0])])
            .unwrap();
        let image = decode_geotiff(&bytes).unwrap();
        let mut sorted = image.tags.clone();
        sorted.sort_unstable();
        assert_eq!(image.tags, sorted);
        assert!(image.tags.contains(&TAG_EXTRA_SAMPLES));
    }

    #[test]
    fn test_single_band_has_no_extra_samples() {
        let bytes = GeoTiffWriter::new(1, 1, transform())
            .encode(&[band("only", vec![3.5])])
            .unwrap();
        let image = decode_geotiff(&bytes).unwrap();
        assert!(!image.tags.contains(&TAG_EXTRA_SAMPLES));
        assert_eq!(image.bands, vec![vec![3.5]]);
    }

    #[test]
    fn test_uncompressed_strips() {
        let bytes = GeoTiffWriter::new(2, 1, transform())
            .compression(TiffCompression::None)
            .encode(&[band("x", vec![1.5, -2.0])])
            .unwrap();
        let image = decode_geotiff(&bytes).unwrap();
        assert_eq!(image.compression, 1);
        assert_eq!(image.bands[0], vec![1.5, -2.0]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let bands = vec![band("t0", (0..20).map(|i| i as f32 * 0.25).collect())];
        let a = GeoTiffWriter::new(5, 4, transform()).encode(&bands).unwrap();
        let b = GeoTiffWriter::new(5, 4, transform()).encode(&bands).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_input() {
        let writer = GeoTiffWriter::new(2, 2, transform());
        assert!(matches!(writer.encode(&[]), Err(GeoTiffError::NoBands)));
        assert!(matches!(
            writer.encode(&[band("short", vec![1.0])]),
            Err(GeoTiffError::BandSize { expected: 4, actual: 1, .. })
        ));
        assert!(matches!(
            GeoTiffWriter::new(0, 2, transform()).encode(&[band("x", vec![])]),
            Err(GeoTiffError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_metadata_is_escaped() {
        let bytes = GeoTiffWriter::new(1, 1, transform())
            .metadata("LOCATION", "A&B <lake>")
            .encode(&[band("t", vec![0.0])])
            .unwrap();
        let image = decode_geotiff(&bytes).unwrap();
        assert_eq!(image.metadata["LOCATION"], "A&B <lake>");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_geotiff(b"MM\0*").is_err());
        assert!(decode_geotiff(b"II").is_err());
    }
}
