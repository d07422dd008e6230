//! Binary dictionaries of ellipsoids, datums, coordinate systems, categories and
//! geodetic transformations.
//!
//! Each file starts with a four byte magic number identifying its kind; the byte order
//! in which the magic reads correctly is the byte order of every record that follows.
//! Records have a fixed size and are kept sorted by key, so lookups binary search the
//! file without reading it whole.
//!
//! ```
//! use geoconv::dictionary::{Dictionary, EllipsoidDef};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let dict = Dictionary::open(dir.path());
//! dict.store(&EllipsoidDef::from_flattening("WGS84", 6_378_137.0, 298.257_223_563)).unwrap();
//! let e: EllipsoidDef = dict.load("wgs84").unwrap();
//! assert_eq!(e.e_rad, 6_378_137.0);
//! ```

pub mod codec;
mod records;

pub use codec::{ByteOrder, FieldLayout};
pub use records::{
    CategoryDef, CoordSystemDef, DatumDef, DictionaryKind, EllipsoidDef, GeodeticTransformDef,
    MAX_CATEGORY_MEMBERS, MREG_TERMS, PRJ_PRM_COUNT, Record, ShiftMethod, TransformMethod,
    compare_keys,
};

use codec::{RecordReader, RecordWriter};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Error;

const MAGIC_LEN: u64 = 4;

/// Held across the read, rewrite and rename of every store or delete.
static WRITES: Mutex<()> = parking_lot::const_mutex(());

/// A directory of dictionary files.
///
/// Stores and deletes within a process are applied one at a time, whichever handle
/// they go through; lookups read whichever complete file is in place.
#[derive(Debug, Clone)]
pub struct Dictionary {
    root: PathBuf,
    create_order: ByteOrder,
}

/// An open dictionary file with its validated header.
struct DictFile {
    path: PathBuf,
    reader: BufReader<File>,
    order: ByteOrder,
    layout: FieldLayout,
    count: usize,
}

impl DictFile {
    fn open(path: PathBuf, kind: DictionaryKind, layout: FieldLayout) -> Result<Self, Error> {
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let len = file.metadata().map_err(|e| Error::io(&path, e))?.len();
        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| Error::format(&path, "file too short for a magic number"))?;
        let order = ByteOrder::detect(magic, kind.magic())
            .ok_or_else(|| Error::format(&path, format!("bad magic number for {kind} dictionary")))?;
        let size = layout.size() as u64;
        let body = len - MAGIC_LEN;
        if body % size != 0 {
            return Err(Error::format(
                &path,
                format!("truncated record: {body} bytes is not a multiple of {size}"),
            ));
        }
        let count = (body / size) as usize;
        debug!(path = %path.display(), %order, records = count, "opened dictionary");
        Ok(DictFile {
            path,
            reader,
            order,
            layout,
            count,
        })
    }

    fn read_at<R: Record>(&mut self, index: usize) -> Result<R, Error> {
        let size = self.layout.size();
        let offset = MAGIC_LEN + (index * size) as u64;
        let mut buf = vec![0u8; size];
        self.reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.reader.read_exact(&mut buf))
            .map_err(|e| Error::io(&self.path, e))?;
        Ok(decode_record(&mut buf, &self.layout, self.order))
    }
}

fn decode_record<R: Record>(buf: &mut [u8], layout: &FieldLayout, order: ByteOrder) -> R {
    codec::unprotect(buf);
    if !order.is_native() {
        layout.swap(buf);
    }
    R::decode(&mut RecordReader::new(buf))
}

fn encode_record<R: Record>(rec: &R, layout: &FieldLayout, order: ByteOrder) -> Vec<u8> {
    let mut w = RecordWriter::with_capacity(layout.size());
    rec.encode(&mut w);
    let mut buf = w.finish();
    debug_assert_eq!(buf.len(), layout.size());
    if !order.is_native() {
        layout.swap(&mut buf);
    }
    if rec.is_protected() {
        codec::protect(&mut buf, codec::protection_key(rec.key()));
    }
    buf
}

fn layout_of<R: Record>() -> Result<FieldLayout, Error> {
    FieldLayout::parse(R::LAYOUT)
        .map_err(|reason| Error::format(R::KIND.file_name(), reason))
}

impl Dictionary {
    /// Use `root` as the dictionary directory. Nothing is read until a lookup.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Dictionary {
            root: root.into(),
            create_order: ByteOrder::NATIVE,
        }
    }

    /// Byte order used when a store creates a new file. Existing files keep theirs.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.create_order = order;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, kind: DictionaryKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub fn exists(&self, kind: DictionaryKind) -> bool {
        self.path_of(kind).is_file()
    }

    fn open_file<R: Record>(&self) -> Result<DictFile, Error> {
        DictFile::open(self.path_of(R::KIND), R::KIND, layout_of::<R>()?)
    }

    /// The byte order a dictionary file declares.
    pub fn byte_order(&self, kind: DictionaryKind) -> Result<ByteOrder, Error> {
        let path = self.path_of(kind);
        let mut magic = [0u8; 4];
        File::open(&path)
            .and_then(|mut f| f.read_exact(&mut magic))
            .map_err(|e| Error::io(&path, e))?;
        ByteOrder::detect(magic, kind.magic())
            .ok_or_else(|| Error::format(&path, format!("bad magic number for {kind} dictionary")))
    }

    /// Look a record up by key with a binary search over the file.
    pub fn load<R: Record>(&self, key: &str) -> Result<R, Error> {
        let mut file = self.open_file::<R>()?;
        let (mut lo, mut hi) = (0, file.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let rec: R = file.read_at(mid)?;
            match compare_keys(rec.key(), key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(rec),
            }
        }
        Err(Error::NotFound {
            kind: R::KIND.name(),
            key: key.to_string(),
        })
    }

    pub fn contains<R: Record>(&self, key: &str) -> Result<bool, Error> {
        match self.load::<R>(key) {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Every record of a kind, in key order.
    pub fn load_all<R: Record>(&self) -> Result<Vec<R>, Error> {
        let mut file = self.open_file::<R>()?;
        (0..file.count).map(|i| file.read_at(i)).collect()
    }

    /// Like [`load_all`](Self::load_all), but a missing file is an empty dictionary.
    pub fn load_all_or_empty<R: Record>(&self) -> Result<Vec<R>, Error> {
        if self.exists(R::KIND) {
            self.load_all()
        } else {
            Ok(Vec::new())
        }
    }

    /// Lazily iterate over the keys of a kind. Call again to restart.
    pub fn enumerate<R: Record>(&self) -> Result<Keys<R>, Error> {
        Ok(Keys {
            file: self.open_file::<R>()?,
            next: 0,
            _kind: PhantomData,
        })
    }

    /// Insert or replace a record, keeping the file sorted.
    pub fn store<R: Record>(&self, def: &R) -> Result<(), Error> {
        def.validate()?;
        let _guard = WRITES.lock();
        let (mut all, order) = self.read_for_update::<R>()?;
        match all.binary_search_by(|r| compare_keys(r.key(), def.key())) {
            Ok(i) => all[i] = def.clone(),
            Err(i) => all.insert(i, def.clone()),
        }
        debug!(kind = %R::KIND, key = def.key(), "storing dictionary record");
        self.write_all(&all, order)
    }

    /// Remove a record. Ellipsoids and datums still referenced elsewhere are refused.
    pub fn delete<R: Record>(&self, key: &str) -> Result<(), Error> {
        let _guard = WRITES.lock();
        self.ensure_unreferenced(R::KIND, key)?;
        let (mut all, order) = self.read_for_update::<R>()?;
        let i = all
            .binary_search_by(|r| compare_keys(r.key(), key))
            .map_err(|_| Error::NotFound {
                kind: R::KIND.name(),
                key: key.to_string(),
            })?;
        all.remove(i);
        debug!(kind = %R::KIND, key, "deleted dictionary record");
        self.write_all(&all, order)
    }

    fn read_for_update<R: Record>(&self) -> Result<(Vec<R>, ByteOrder), Error> {
        if !self.exists(R::KIND) {
            return Ok((Vec::new(), self.create_order));
        }
        let mut file = self.open_file::<R>()?;
        let order = file.order;
        let mut all = (0..file.count)
            .map(|i| file.read_at(i))
            .collect::<Result<Vec<R>, _>>()?;
        all.sort_by(|a, b| compare_keys(a.key(), b.key()));
        Ok((all, order))
    }

    fn write_all<R: Record>(&self, records: &[R], order: ByteOrder) -> Result<(), Error> {
        let layout = layout_of::<R>()?;
        let path = self.path_of(R::KIND);
        let tmp = path.with_extension(format!("tmp{}", std::process::id()));
        fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;
        {
            let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
            let mut w = BufWriter::new(file);
            w.write_all(&order.magic_bytes(R::KIND.magic()))
                .map_err(|e| Error::io(&tmp, e))?;
            for rec in records {
                w.write_all(&encode_record(rec, &layout, order))
                    .map_err(|e| Error::io(&tmp, e))?;
            }
            w.flush().map_err(|e| Error::io(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))
    }

    fn ensure_unreferenced(&self, kind: DictionaryKind, key: &str) -> Result<(), Error> {
        let holder = match kind {
            DictionaryKind::Ellipsoid => self
                .first_referrer::<DatumDef>(kind, key)?
                .or(self.first_referrer::<CoordSystemDef>(kind, key)?),
            DictionaryKind::Datum => self
                .first_referrer::<CoordSystemDef>(kind, key)?
                .or(self.first_referrer::<GeodeticTransformDef>(kind, key)?),
            _ => None,
        };
        match holder {
            Some(by) => Err(Error::Configuration(format!(
                "{kind} `{key}` is still referenced by {by}"
            ))),
            None => Ok(()),
        }
    }

    fn first_referrer<R: Record>(
        &self,
        kind: DictionaryKind,
        key: &str,
    ) -> Result<Option<String>, Error> {
        Ok(self
            .load_all_or_empty::<R>()?
            .into_iter()
            .find(|r| r.references(kind, key))
            .map(|r| format!("{} `{}`", R::KIND, r.key())))
    }
}

/// Lazy iterator over the keys of one dictionary file.
pub struct Keys<R> {
    file: DictFile,
    next: usize,
    _kind: PhantomData<R>,
}

impl<R: Record> Keys<R> {
    /// Number of records in the file.
    pub fn len(&self) -> usize {
        self.file.count
    }

    pub fn is_empty(&self) -> bool {
        self.file.count == 0
    }

    /// Start again from the first record.
    pub fn rewind(&mut self) {
        self.next = 0;
    }
}

impl<R: Record> Iterator for Keys<R> {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.file.count {
            return None;
        }
        let i = self.next;
        self.next += 1;
        Some(self.file.read_at::<R>(i).map(|r| r.key().to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dict() -> (tempfile::TempDir, Dictionary) {
        let dir = tempfile::tempdir().unwrap();
        let dict = Dictionary::open(dir.path());
        (dir, dict)
    }

    fn clarke() -> EllipsoidDef {
        EllipsoidDef::new("CLRK66", 6_378_206.4, 6_356_583.8)
    }

    #[test]
    fn store_load_enumerate() {
        let (_dir, dict) = dict();
        for key in ["WGS84", "CLRK66", "INTL", "GRS1980", "BESSEL"] {
            dict.store(&EllipsoidDef::new(key, 6_378_137.0, 6_356_752.3))
                .unwrap();
        }
        let keys: Vec<String> = dict
            .enumerate::<EllipsoidDef>()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(keys, ["BESSEL", "CLRK66", "GRS1980", "INTL", "WGS84"]);

        for key in &keys {
            let e: EllipsoidDef = dict.load(&key.to_lowercase()).unwrap();
            assert_eq!(&e.key_nm, key);
        }
        assert!(matches!(
            dict.load::<EllipsoidDef>("AIRY"),
            Err(Error::NotFound { kind: "ellipsoid", .. })
        ));
    }

    #[test]
    fn enumeration_restarts() {
        let (_dir, dict) = dict();
        dict.store(&clarke()).unwrap();
        let mut keys = dict.enumerate::<EllipsoidDef>().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.next().unwrap().unwrap(), "CLRK66");
        assert!(keys.next().is_none());
        keys.rewind();
        assert_eq!(keys.next().unwrap().unwrap(), "CLRK66");
    }

    #[test]
    fn store_replaces_existing_key() {
        let (_dir, dict) = dict();
        dict.store(&clarke()).unwrap();
        let mut edited = clarke();
        edited.description = "Clarke 1866".into();
        edited.key_nm = "clrk66".into();
        dict.store(&edited).unwrap();
        let all = dict.load_all::<EllipsoidDef>().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "Clarke 1866");
    }

    #[test]
    fn foreign_byte_order_round_trips() {
        let (_dir, dict) = dict();
        let foreign = match ByteOrder::NATIVE {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        };
        let writer = dict.clone().with_byte_order(foreign);
        let mut cs = CoordSystemDef::new("UTM83-10", "UTM", "METER").on_datum("NAD83");
        cs.prj_prms[0] = 10.0;
        cs.prj_prms[1] = 1.0;
        cs.ll_min = [-126.0, 30.0];
        cs.ll_max = [-120.0, 50.0];
        cs.quad = -2;
        cs.epsg = 102_100;
        writer.store(&cs).unwrap();

        assert_eq!(
            dict.byte_order(DictionaryKind::CoordinateSystem).unwrap(),
            foreign
        );
        let back: CoordSystemDef = dict.load("UTM83-10").unwrap();
        assert_eq!(back.prj_prms[0], 10.0);
        assert!(back.prj_prms[2].is_nan());
        assert!(back.org_lng.is_nan());
        assert_eq!(back.ll_min, cs.ll_min);
        assert_eq!(back.quad, -2);
        assert_eq!(back.epsg, 102_100);
        assert_eq!(back.key_nm, cs.key_nm);
        assert_eq!(back.unit, cs.unit);

        // A later store through a native-order handle keeps the file's order.
        dict.store(&CoordSystemDef::new("LL83", "LL", "DEGREE").on_datum("NAD83"))
            .unwrap();
        assert_eq!(
            dict.byte_order(DictionaryKind::CoordinateSystem).unwrap(),
            foreign
        );
    }

    #[test]
    fn protected_records_are_obfuscated_on_disk() {
        let (_dir, dict) = dict();
        let mut dt = DatumDef::new("NAD27", "CLRK66")
            .with_shift(ShiftMethod::Molodensky, [-8.0, 160.0, 176.0]);
        dt.protect = 1;
        dt.epsg = 1_000_267;
        dict.store(&dt).unwrap();
        let raw = fs::read(dict.path_of(DictionaryKind::Datum)).unwrap();
        assert!(!raw.windows(5).any(|w| w == b"NAD27"));
        let back: DatumDef = dict.load("NAD27").unwrap();
        assert_eq!(back, dt);
    }

    #[test]
    fn bad_magic_is_a_format_error() {
        let (_dir, dict) = dict();
        fs::write(dict.path_of(DictionaryKind::Ellipsoid), b"NOPE").unwrap();
        assert!(matches!(
            dict.load::<EllipsoidDef>("WGS84"),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        let (_dir, dict) = dict();
        dict.store(&clarke()).unwrap();
        let path = dict.path_of(DictionaryKind::Ellipsoid);
        let mut raw = fs::read(&path).unwrap();
        raw.truncate(raw.len() - 3);
        fs::write(&path, raw).unwrap();
        let err = dict.load::<EllipsoidDef>("CLRK66").unwrap_err();
        assert!(err.to_string().contains("truncated record"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let (_dir, dict) = dict();
        assert!(matches!(
            dict.load::<DatumDef>("NAD27"),
            Err(Error::Io { .. })
        ));
        assert!(dict.load_all_or_empty::<DatumDef>().unwrap().is_empty());
    }

    #[test]
    fn referenced_definitions_cannot_be_deleted() {
        let (_dir, dict) = dict();
        dict.store(&clarke()).unwrap();
        dict.store(&DatumDef::new("NAD27", "CLRK66")).unwrap();
        dict.store(&CoordSystemDef::new("LL27", "LL", "DEGREE").on_datum("NAD27"))
            .unwrap();

        assert!(matches!(
            dict.delete::<EllipsoidDef>("CLRK66"),
            Err(Error::Configuration(_))
        ));
        assert!(dict.delete::<DatumDef>("NAD27").is_err());

        dict.delete::<CoordSystemDef>("LL27").unwrap();
        dict.delete::<DatumDef>("NAD27").unwrap();
        dict.delete::<EllipsoidDef>("CLRK66").unwrap();
        assert!(dict.load_all::<EllipsoidDef>().unwrap().is_empty());
        assert!(matches!(
            dict.delete::<EllipsoidDef>("CLRK66"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn concurrent_stores_keep_every_record() {
        let (_dir, dict) = dict();
        std::thread::scope(|s| {
            for t in 0..4 {
                let dict = dict.clone();
                s.spawn(move || {
                    for i in 0..25 {
                        let key = format!("E{t}-{i:02}");
                        dict.store(&EllipsoidDef::new(&key, 6_378_137.0 + i as f64, 6_356_752.3))
                            .unwrap();
                    }
                });
            }
        });
        let keys = dict.enumerate::<EllipsoidDef>().unwrap();
        assert_eq!(keys.len(), 100);

        // Deletes racing stores of other keys lose nothing either.
        std::thread::scope(|s| {
            let deleter = dict.clone();
            s.spawn(move || {
                for i in 0..25 {
                    deleter.delete::<EllipsoidDef>(&format!("E0-{i:02}")).unwrap();
                }
            });
            let writer = dict.clone();
            s.spawn(move || {
                for i in 0..25 {
                    writer
                        .store(&EllipsoidDef::new(&format!("F-{i:02}"), 6_378_137.0, 6_356_752.3))
                        .unwrap();
                }
            });
        });
        let all = dict.load_all::<EllipsoidDef>().unwrap();
        assert_eq!(all.len(), 100);
        assert!(!all.iter().any(|e| e.key_nm.starts_with("E0-")));
        assert!(all.windows(2).all(|w| compare_keys(&w[0].key_nm, &w[1].key_nm).is_lt()));
    }

    #[test]
    fn category_members_survive() {
        let (_dir, dict) = dict();
        let cat = CategoryDef::new("Universal Transverse Mercator", &["UTM83-10", "UTM83-11"]);
        dict.store(&cat).unwrap();
        let back: CategoryDef = dict.load("universal transverse mercator").unwrap();
        assert_eq!(back.members, ["UTM83-10", "UTM83-11"]);
    }
}
