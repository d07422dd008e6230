//! Binary correction grids.
//!
//! A grid file is a 72 byte header followed by a row-major payload starting at the
//! south-west node. The header's magic number fixes the byte order of everything after
//! it, exactly as for dictionary files:
//!
//! | offset | field |
//! |---|---|
//! | 0 | magic `GXG1` |
//! | 4 | kind (1 shift, 2 geoid), element size (4 or 8), values per node, reserved: `i16` |
//! | 12 | padding |
//! | 16 | south, west, north, east, latitude step, longitude step: `f64` degrees |
//! | 64 | rows, columns: `i32` |
//!
//! Shift grids store longitude then latitude shift per node, in arc-seconds; geoid grids
//! store one height in metres.

use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::cache::MruCache;
use crate::dictionary::codec::{FieldLayout, RecordReader, RecordWriter};
use crate::dictionary::ByteOrder;
use crate::error::Error;

pub const GRID_MAGIC: u32 = u32::from_be_bytes(*b"GXG1");
pub const HEADER_LEN: usize = 72;
const HEADER_LAYOUT: &str = "4s4c6d2l";

/// What a grid's nodes hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    /// Longitude and latitude shifts, arc-seconds
    Shift,
    /// Geoid heights, metres
    Geoid,
}

impl GridKind {
    fn code(self) -> i16 {
        match self {
            GridKind::Shift => 1,
            GridKind::Geoid => 2,
        }
    }

    fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(GridKind::Shift),
            2 => Some(GridKind::Geoid),
            _ => None,
        }
    }

    pub fn values_per_node(self) -> usize {
        match self {
            GridKind::Shift => 2,
            GridKind::Geoid => 1,
        }
    }
}

/// Extent and shape of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridHeader {
    pub kind: GridKind,
    /// Bytes per stored value: 4 (`f32`) or 8 (`f64`)
    pub element_size: usize,
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
    pub dlat: f64,
    pub dlng: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridHeader {
    /// A header spanning `rows` by `cols` nodes from the south-west corner.
    pub fn new(kind: GridKind, south_west: (f64, f64), step: (f64, f64), rows: usize, cols: usize) -> Self {
        let (west, south) = south_west;
        let (dlng, dlat) = step;
        GridHeader {
            kind,
            element_size: 4,
            south,
            west,
            north: south + (rows.saturating_sub(1)) as f64 * dlat,
            east: west + (cols.saturating_sub(1)) as f64 * dlng,
            dlat,
            dlng,
            rows,
            cols,
        }
    }

    pub fn with_element_size(mut self, element_size: usize) -> Self {
        self.element_size = element_size;
        self
    }

    pub fn values_per_node(&self) -> usize {
        self.kind.values_per_node()
    }

    pub fn row_len(&self) -> usize {
        self.cols.saturating_mul(self.values_per_node())
    }

    fn row_bytes(&self) -> usize {
        self.row_len().saturating_mul(self.element_size)
    }

    /// Payload size in bytes; saturates for shapes [`validate`](Self::validate) rejects.
    pub fn payload_len(&self) -> usize {
        self.rows.saturating_mul(self.row_bytes())
    }

    fn checked_payload_len(&self) -> Option<usize> {
        self.cols
            .checked_mul(self.values_per_node())?
            .checked_mul(self.element_size)?
            .checked_mul(self.rows)
            .filter(|&n| n <= isize::MAX as usize)
    }

    /// Whether the point lies on or inside the outermost nodes.
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lng)
    }

    fn validate(&self) -> Result<(), String> {
        if self.element_size != 4 && self.element_size != 8 {
            return Err(format!("element size {} is neither 4 nor 8", self.element_size));
        }
        if self.rows < 2 || self.cols < 2 {
            return Err(format!("{} x {} nodes cannot be interpolated", self.rows, self.cols));
        }
        if self.checked_payload_len().is_none() {
            return Err(format!("{} x {} nodes overflow the payload size", self.rows, self.cols));
        }
        if !(self.dlat > 0.0 && self.dlng > 0.0) {
            return Err(format!("non-positive cell size {} x {}", self.dlat, self.dlng));
        }
        let tol = 1e-6 * self.dlat.min(self.dlng);
        let north = self.south + (self.rows - 1) as f64 * self.dlat;
        let east = self.west + (self.cols - 1) as f64 * self.dlng;
        if (north - self.north).abs() > tol || (east - self.east).abs() > tol {
            return Err("extent disagrees with node count and spacing".into());
        }
        Ok(())
    }

    fn encode(&self, order: ByteOrder) -> Result<Vec<u8>, Error> {
        let layout = header_layout()?;
        let mut w = RecordWriter::with_capacity(layout.size());
        w.i16(self.kind.code());
        w.i16(self.element_size as i16);
        w.i16(self.values_per_node() as i16);
        w.i16(0);
        w.fill(4);
        w.f64s(&[self.south, self.west, self.north, self.east, self.dlat, self.dlng]);
        w.i32(self.rows as i32);
        w.i32(self.cols as i32);
        let mut body = w.finish();
        if !order.is_native() {
            layout.swap(&mut body);
        }
        let mut out = order.magic_bytes(GRID_MAGIC).to_vec();
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode(path: &Path, bytes: &[u8; HEADER_LEN]) -> Result<(Self, ByteOrder), Error> {
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let order = ByteOrder::detect(magic, GRID_MAGIC)
            .ok_or_else(|| Error::format(path, "bad magic number for a grid file"))?;
        let mut body = bytes[4..].to_vec();
        if !order.is_native() {
            header_layout()?.swap(&mut body);
        }
        let mut r = RecordReader::new(&body);
        let kind_code = r.i16();
        let kind = GridKind::from_code(kind_code)
            .ok_or_else(|| Error::format(path, format!("unknown grid kind {kind_code}")))?;
        let element_size = r.i16().max(0) as usize;
        let per_node = r.i16();
        r.skip(2 + 4);
        if per_node as usize != kind.values_per_node() {
            return Err(Error::format(path, format!("{per_node} values per node for a {kind:?} grid")));
        }
        let [south, west, north, east, dlat, dlng] = r.f64s::<6>();
        let header = GridHeader {
            kind,
            element_size,
            south,
            west,
            north,
            east,
            dlat,
            dlng,
            rows: r.i32().max(0) as usize,
            cols: r.i32().max(0) as usize,
        };
        header.validate().map_err(|reason| Error::format(path, reason))?;
        Ok((header, order))
    }
}

fn header_layout() -> Result<FieldLayout, Error> {
    FieldLayout::parse(HEADER_LAYOUT).map_err(|reason| Error::format("grid header", reason))
}

/// Write a grid file. `values` holds `rows * cols * values_per_node` numbers, row-major
/// from the south-west node.
pub fn write_grid_file(
    path: impl AsRef<Path>,
    header: &GridHeader,
    values: &[f64],
    order: ByteOrder,
) -> Result<(), Error> {
    let path = path.as_ref();
    header
        .validate()
        .map_err(|reason| Error::format(path, reason))?;
    let expected = header.rows * header.row_len();
    if values.len() != expected {
        return Err(Error::format(
            path,
            format!("{} values supplied for {expected} grid slots", values.len()),
        ));
    }
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut w = BufWriter::new(file);
    let mut out = header.encode(order)?;
    out.reserve(header.payload_len());
    for &v in values {
        match (header.element_size, order) {
            (4, ByteOrder::Little) => out.extend_from_slice(&(v as f32).to_le_bytes()),
            (4, ByteOrder::Big) => out.extend_from_slice(&(v as f32).to_be_bytes()),
            (_, ByteOrder::Little) => out.extend_from_slice(&v.to_le_bytes()),
            (_, ByteOrder::Big) => out.extend_from_slice(&v.to_be_bytes()),
        }
    }
    w.write_all(&out).map_err(|e| Error::io(path, e))?;
    w.flush().map_err(|e| Error::io(path, e))
}

#[derive(Debug)]
struct Buffer {
    file: Option<File>,
    rows: MruCache<usize, Vec<f64>>,
}

/// An open grid: header in memory, payload read a row at a time on demand.
#[derive(Debug)]
pub struct GridFile {
    path: PathBuf,
    header: GridHeader,
    order: ByteOrder,
    buffer: Mutex<Buffer>,
}

impl GridFile {
    /// Read and validate the header; the payload stays on disk until queried.
    pub fn open(path: impl Into<PathBuf>, row_buffer: usize) -> Result<Self, Error> {
        let path = path.into();
        let mut file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let mut raw = [0u8; HEADER_LEN];
        file.read_exact(&mut raw)
            .map_err(|_| Error::format(&path, "file too short for a grid header"))?;
        let (header, order) = GridHeader::decode(&path, &raw)?;
        let len = fs::metadata(&path).map_err(|e| Error::io(&path, e))?.len();
        let payload = len - HEADER_LEN as u64;
        if payload != header.payload_len() as u64 {
            return Err(Error::format(
                &path,
                format!(
                    "truncated payload: {payload} bytes where {} are expected",
                    header.payload_len()
                ),
            ));
        }
        debug!(path = %path.display(), kind = ?header.kind, rows = header.rows, cols = header.cols, %order, "opened grid");
        Ok(GridFile {
            path,
            header,
            order,
            buffer: Mutex::new(Buffer {
                file: None,
                rows: MruCache::new(row_buffer),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        self.header.contains(lng, lat)
    }

    /// Bilinearly interpolated node values at a point, or `None` outside the grid.
    pub fn interpolate(&self, lng: f64, lat: f64) -> Result<Option<[f64; 2]>, Error> {
        let h = &self.header;
        if !h.contains(lng, lat) {
            return Ok(None);
        }
        let fr = (lat - h.south) / h.dlat;
        let fc = (lng - h.west) / h.dlng;
        let row = (fr.floor() as usize).min(h.rows - 2);
        let col = (fc.floor() as usize).min(h.cols - 2);
        let (tr, tc) = (fr - row as f64, fc - col as f64);

        let n = h.values_per_node();
        let mut buffer = self.buffer.lock();
        let lower = self.nodes(&mut buffer, row, col)?;
        let upper = self.nodes(&mut buffer, row + 1, col)?;
        drop(buffer);

        let mut out = [0.0; 2];
        for (i, v) in out.iter_mut().enumerate().take(n) {
            let (sw, se) = (lower[i], lower[n + i]);
            let (nw, ne) = (upper[i], upper[n + i]);
            let south = sw + tc * (se - sw);
            let north = nw + tc * (ne - nw);
            *v = south + tr * (north - south);
        }
        Ok(Some(out))
    }

    /// Values of the nodes at `col` and `col + 1` of a row, read through the row buffer.
    fn nodes(&self, buffer: &mut Buffer, row: usize, col: usize) -> Result<[f64; 4], Error> {
        let n = self.header.values_per_node();
        if buffer.rows.get(&row).is_none() {
            let values = self.read_row(&mut buffer.file, row)?;
            buffer.rows.insert(row, values);
        }
        let mut out = [0.0; 4];
        if let Some(values) = buffer.rows.get(&row) {
            out[..2 * n].copy_from_slice(&values[col * n..(col + 2) * n]);
        }
        Ok(out)
    }

    fn read_row(&self, file: &mut Option<File>, row: usize) -> Result<Vec<f64>, Error> {
        let h = &self.header;
        if file.is_none() {
            debug!(path = %self.path.display(), "loading grid payload");
            *file = Some(File::open(&self.path).map_err(|e| Error::io(&self.path, e))?);
        }
        let Some(f) = file.as_mut() else {
            return Err(Error::format(&self.path, "grid payload unavailable"));
        };
        trace!(path = %self.path.display(), row, "reading grid row");
        let mut raw = vec![0u8; h.row_bytes()];
        let offset = (HEADER_LEN + row * h.row_bytes()) as u64;
        f.seek(SeekFrom::Start(offset))
            .and_then(|_| f.read_exact(&mut raw))
            .map_err(|e| Error::io(&self.path, e))?;
        let order = self.order;
        let values = raw
            .chunks_exact(h.element_size)
            .map(|c| match (c.len(), order) {
                (4, ByteOrder::Little) => f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                (4, ByteOrder::Big) => f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64,
                (_, ByteOrder::Little) => f64::from_le_bytes(eight(c)),
                (_, ByteOrder::Big) => f64::from_be_bytes(eight(c)),
            })
            .collect();
        Ok(values)
    }

    /// Rows currently buffered.
    pub fn buffered_rows(&self) -> usize {
        self.buffer.lock().rows.len()
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.lock().file.is_some()
    }
}

fn eight(c: &[u8]) -> [u8; 8] {
    let mut b = [0u8; 8];
    b.copy_from_slice(&c[..8]);
    b
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// 5 x 4 nodes over (-100..-97, 30..34); shift varies linearly so bilinear
    /// interpolation is exact.
    pub(crate) fn linear_shift_grid(dir: &Path, order: ByteOrder, element_size: usize) -> PathBuf {
        let header = GridHeader::new(GridKind::Shift, (-100.0, 30.0), (1.0, 1.0), 5, 4)
            .with_element_size(element_size);
        let mut values = Vec::new();
        for r in 0..5 {
            for c in 0..4 {
                values.push(0.5 + 0.25 * c as f64);
                values.push(-1.0 + 0.5 * r as f64);
            }
        }
        let path = dir.join(format!("shift-{order}-{element_size}.gxg"));
        write_grid_file(&path, &header, &values, order).unwrap();
        path
    }

    #[test]
    fn header_round_trips_in_both_orders() {
        let dir = tempfile::tempdir().unwrap();
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let path = linear_shift_grid(dir.path(), order, 8);
            let grid = GridFile::open(&path, 4).unwrap();
            assert_eq!(grid.header().rows, 5);
            assert_eq!(grid.header().cols, 4);
            assert_eq!(grid.header().north, 34.0);
            assert_eq!(grid.header().east, -97.0);
        }
    }

    #[test]
    fn payload_loads_lazily_and_interpolates() {
        let dir = tempfile::tempdir().unwrap();
        for (order, size) in [(ByteOrder::Big, 4), (ByteOrder::Little, 8)] {
            let grid = GridFile::open(linear_shift_grid(dir.path(), order, size), 2).unwrap();
            assert!(!grid.is_loaded());
            assert_eq!(grid.interpolate(-90.0, 31.0).unwrap(), None);
            assert!(!grid.is_loaded());

            let [dlng, dlat] = grid.interpolate(-98.5, 32.25).unwrap().unwrap();
            assert!(grid.is_loaded());
            assert_abs_diff_eq!(dlng, 0.5 + 0.25 * 1.5, epsilon = 1e-6);
            assert_abs_diff_eq!(dlat, -1.0 + 0.5 * 2.25, epsilon = 1e-6);

            // Edges interpolate from the last cell.
            let [dlng, dlat] = grid.interpolate(-97.0, 34.0).unwrap().unwrap();
            assert_abs_diff_eq!(dlng, 1.25, epsilon = 1e-6);
            assert_abs_diff_eq!(dlat, 1.0, epsilon = 1e-6);
            assert!(grid.buffered_rows() <= 2);
        }
    }

    #[test]
    fn geoid_grid_single_value() {
        let dir = tempfile::tempdir().unwrap();
        let header = GridHeader::new(GridKind::Geoid, (0.0, 50.0), (0.5, 0.5), 3, 3);
        let values: Vec<f64> = (0..9).map(|i| 40.0 + i as f64).collect();
        let path = dir.path().join("geoid.gxg");
        write_grid_file(&path, &header, &values, ByteOrder::NATIVE).unwrap();
        let grid = GridFile::open(&path, 16).unwrap();
        let [n, _] = grid.interpolate(0.25, 50.0).unwrap().unwrap();
        assert_abs_diff_eq!(n, 40.5, epsilon = 1e-5);
    }

    #[test]
    fn oversized_headers_are_format_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.gxg");
        for n in [i32::MAX as usize, 100_000] {
            let header = GridHeader::new(GridKind::Shift, (0.0, 0.0), (1e-9, 1e-9), n, n);
            fs::write(&path, header.encode(ByteOrder::Big).unwrap()).unwrap();
            let err = GridFile::open(&path, 4).unwrap_err();
            assert!(matches!(err, Error::Format { .. }), "{err}");
        }
        let header = GridHeader::new(GridKind::Geoid, (0.0, 0.0), (1e-9, 1e-9), i32::MAX as usize, 3);
        assert!(matches!(
            write_grid_file(&path, &header, &[], ByteOrder::NATIVE),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn corrupt_files_are_format_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = linear_shift_grid(dir.path(), ByteOrder::NATIVE, 4);
        let mut raw = fs::read(&path).unwrap();
        raw.truncate(raw.len() - 1);
        fs::write(&path, &raw).unwrap();
        assert!(matches!(GridFile::open(&path, 4), Err(Error::Format { .. })));

        raw[..4].copy_from_slice(b"JUNK");
        fs::write(&path, &raw).unwrap();
        assert!(matches!(GridFile::open(&path, 4), Err(Error::Format { .. })));

        let header = GridHeader::new(GridKind::Shift, (0.0, 0.0), (1.0, 1.0), 2, 2);
        let res = write_grid_file(dir.path().join("short.gxg"), &header, &[0.0; 3], ByteOrder::NATIVE);
        assert!(matches!(res, Err(Error::Format { .. })));
    }
}
