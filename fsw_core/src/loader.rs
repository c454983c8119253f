//! Declarative object loader.
//!
//! An [`ObjDescriptor`] binds a JSON key path to a typed destination. The
//! loader resolves the path in a [`Document`], checks the value against the
//! destination type and size, and writes it. Apps describe a whole table as a
//! slice of descriptors and count how many resolved.
//!
//! # Example
//!
//! ```rust
//! use fsw_common::events::tracing_sink;
//! use fsw_core::loader::{Document, ObjDescriptor, ObjectLoader};
//!
//! let doc = Document::parse(r#"{ "gain": { "k": 12 } }"#).unwrap();
//! let mut k = 0u16;
//! let mut desc = ObjDescriptor::new("gain.k", &mut k);
//! assert!(ObjectLoader::new(tracing_sink()).load_object(&mut desc, &doc));
//! assert_eq!(k, 12);
//! ```

mod path;

use std::fmt;
use std::fs;
use std::path::Path;

use fsw_common::consts::MAX_LOADER_OBJECTS;
use fsw_common::events::{EventKind, SharedSink, eid};
use serde_json::{Number, Value};

use crate::error::LoaderError;

/// Value category a destination accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Float,
    String,
}

impl ValueType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed mutable target of a descriptor.
#[derive(Debug)]
pub enum Destination<'a> {
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    I32(&'a mut i32),
    I64(&'a mut i64),
    F32(&'a mut f32),
    F64(&'a mut f64),
    /// Text buffer holding at most `size - 1` bytes (one byte is reserved
    /// for the terminator of the fixed-size field it models).
    Str { buf: &'a mut String, size: usize },
}

impl<'a> Destination<'a> {
    /// String destination of `size` bytes including terminator.
    pub fn string(buf: &'a mut String, size: usize) -> Self {
        Self::Str { buf, size }
    }

    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::U8(_) | Self::U16(_) | Self::U32(_) | Self::I32(_) | Self::I64(_) => {
                ValueType::Integer
            }
            Self::F32(_) | Self::F64(_) => ValueType::Float,
            Self::Str { .. } => ValueType::String,
        }
    }

    /// Destination size in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) | Self::I32(_) | Self::F32(_) => 4,
            Self::I64(_) | Self::F64(_) => 8,
            Self::Str { size, .. } => *size,
        }
    }
}

macro_rules! impl_destination_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> From<&'a mut $ty> for Destination<'a> {
                fn from(value: &'a mut $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_destination_from!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

/// One key path bound to one destination.
#[derive(Debug)]
pub struct ObjDescriptor<'a> {
    query_key: String,
    dest: Destination<'a>,
    updated: bool,
}

impl<'a> ObjDescriptor<'a> {
    pub fn new(query_key: impl Into<String>, dest: impl Into<Destination<'a>>) -> Self {
        Self {
            query_key: query_key.into(),
            dest: dest.into(),
            updated: false,
        }
    }

    /// String descriptor of `size` bytes including terminator.
    pub fn string(query_key: impl Into<String>, buf: &'a mut String, size: usize) -> Self {
        Self::new(query_key, Destination::string(buf, size))
    }

    pub fn query_key(&self) -> &str {
        &self.query_key
    }

    pub const fn value_type(&self) -> ValueType {
        self.dest.value_type()
    }

    /// True if the most recent load attempt wrote the destination.
    pub const fn updated(&self) -> bool {
        self.updated
    }
}

/// Parsed JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, LoaderError> {
        serde_json::from_str(text)
            .map(|root| Self { root })
            .map_err(|e| LoaderError::Parse(e.to_string()))
    }

    /// Value at `key`, `Ok(None)` if absent.
    pub fn lookup(&self, key: &str) -> Result<Option<&Value>, LoaderError> {
        path::resolve(&self.root, key)
    }

    /// True if `key` resolves to a value.
    pub fn contains(&self, key: &str) -> bool {
        matches!(self.lookup(key), Ok(Some(_)))
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolve `desc` in `doc` and write its destination.
///
/// Clears `updated` first and sets it only on success. Does not report.
pub fn try_load_object(desc: &mut ObjDescriptor<'_>, doc: &Document) -> Result<(), LoaderError> {
    desc.updated = false;
    let key = desc.query_key.as_str();
    let value = doc.lookup(key)?.ok_or_else(|| LoaderError::Missing {
        key: key.to_owned(),
    })?;
    store(key, &mut desc.dest, value)?;
    desc.updated = true;
    Ok(())
}

fn store(key: &str, dest: &mut Destination<'_>, value: &Value) -> Result<(), LoaderError> {
    let mismatch = |dest: &Destination<'_>| LoaderError::TypeMismatch {
        key: key.to_owned(),
        expected: dest.value_type(),
        found: json_type_name(value),
    };

    match (dest, value) {
        (Destination::Str { buf, size }, Value::String(text)) => {
            if text.len() + 1 > *size {
                return Err(LoaderError::StringTooLong {
                    key: key.to_owned(),
                    len: text.len(),
                    size: *size,
                });
            }
            **buf = text.clone();
            Ok(())
        }
        (dest, Value::Number(n)) => {
            let size = dest.size();
            match dest {
                Destination::U8(v) => **v = integer(key, n, size)?,
                Destination::U16(v) => **v = integer(key, n, size)?,
                Destination::U32(v) => **v = integer(key, n, size)?,
                Destination::I32(v) => **v = integer(key, n, size)?,
                Destination::I64(v) => **v = integer(key, n, size)?,
                Destination::F64(v) => **v = float(key, n)?,
                Destination::F32(v) => {
                    let wide = float(key, n)?;
                    let narrow = wide as f32;
                    if !narrow.is_finite() {
                        return Err(LoaderError::OutOfRange {
                            key: key.to_owned(),
                            text: n.to_string(),
                            size,
                        });
                    }
                    **v = narrow;
                }
                Destination::Str { .. } => return Err(mismatch(dest)),
            }
            Ok(())
        }
        (dest, _) => Err(mismatch(dest)),
    }
}

/// Integer in the destination's width. Integral floats such as `5.0` are
/// accepted; fractional values are not.
fn integer<T>(key: &str, n: &Number, size: usize) -> Result<T, LoaderError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let out_of_range = || LoaderError::OutOfRange {
        key: key.to_owned(),
        text: n.to_string(),
        size,
    };

    if let Some(i) = n.as_i64() {
        return <T as TryFrom<i64>>::try_from(i).map_err(|_| out_of_range());
    }
    if let Some(u) = n.as_u64() {
        return <T as TryFrom<u64>>::try_from(u).map_err(|_| out_of_range());
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            <T as TryFrom<i64>>::try_from(f as i64).map_err(|_| out_of_range())
        }
        Some(f) if f.fract() == 0.0 => Err(out_of_range()),
        _ => Err(LoaderError::NumberParse {
            key: key.to_owned(),
            text: n.to_string(),
            expected: ValueType::Integer,
        }),
    }
}

fn float(key: &str, n: &Number) -> Result<f64, LoaderError> {
    n.as_f64().ok_or_else(|| LoaderError::NumberParse {
        key: key.to_owned(),
        text: n.to_string(),
        expected: ValueType::Float,
    })
}

fn event_id(err: &LoaderError) -> u16 {
    match err {
        LoaderError::Missing { .. } => eid::LOADER_MISSING,
        LoaderError::BadKeyPath { .. } => eid::LOADER_KEY,
        LoaderError::TypeMismatch { .. } => eid::LOADER_TYPE,
        LoaderError::StringTooLong { .. } => eid::LOADER_STRING_LEN,
        LoaderError::NumberParse { .. } | LoaderError::OutOfRange { .. } => eid::LOADER_NUMBER,
        LoaderError::TooManyObjects { .. } => eid::LOADER_TOO_MANY,
        LoaderError::EmptyFile { .. }
        | LoaderError::FileTooLarge { .. }
        | LoaderError::Io { .. }
        | LoaderError::Parse(_) => eid::LOADER_FILE,
    }
}

/// Loads descriptors from documents and reports every failure.
#[derive(Clone)]
pub struct ObjectLoader {
    events: SharedSink,
}

impl ObjectLoader {
    pub fn new(events: SharedSink) -> Self {
        Self { events }
    }

    fn report(&self, err: &LoaderError) {
        self.events
            .send(event_id(err), EventKind::Error, &err.to_string());
    }

    /// Load a required object. A missing key is reported.
    pub fn load_object(&self, desc: &mut ObjDescriptor<'_>, doc: &Document) -> bool {
        match try_load_object(desc, doc) {
            Ok(()) => true,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Load an optional object. A missing key is not reported.
    pub fn load_object_optional(&self, desc: &mut ObjDescriptor<'_>, doc: &Document) -> bool {
        match try_load_object(desc, doc) {
            Ok(()) => true,
            Err(LoaderError::Missing { .. }) => false,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Load every descriptor as required. Returns how many were updated.
    ///
    /// More than [`MAX_LOADER_OBJECTS`] descriptors is a capacity error:
    /// nothing is loaded and 0 is returned.
    pub fn load_object_array(&self, descs: &mut [ObjDescriptor<'_>], doc: &Document) -> usize {
        self.load_each(descs, doc, Self::load_object)
    }

    /// Like [`load_object_array`](Self::load_object_array) with optional semantics.
    pub fn load_object_array_optional(
        &self,
        descs: &mut [ObjDescriptor<'_>],
        doc: &Document,
    ) -> usize {
        self.load_each(descs, doc, Self::load_object_optional)
    }

    fn load_each(
        &self,
        descs: &mut [ObjDescriptor<'_>],
        doc: &Document,
        load: fn(&Self, &mut ObjDescriptor<'_>, &Document) -> bool,
    ) -> usize {
        if descs.len() > MAX_LOADER_OBJECTS {
            // a rejected call is still an attempt for every descriptor
            for desc in descs.iter_mut() {
                desc.updated = false;
            }
            self.report(&LoaderError::TooManyObjects {
                count: descs.len(),
                max: MAX_LOADER_OBJECTS,
            });
            return 0;
        }
        descs
            .iter_mut()
            .map(|desc| load(self, desc, doc))
            .filter(|&ok| ok)
            .count()
    }

    /// Read `path`, parse it and hand the document to `load`.
    ///
    /// Empty files, files over `max_len` bytes, I/O and parse failures are
    /// reported and returned without calling `load`.
    pub fn process_file<R, E, F>(&self, path: &Path, max_len: usize, load: F) -> Result<R, E>
    where
        E: From<LoaderError>,
        F: FnOnce(&Document) -> Result<R, E>,
    {
        let doc = read_document(path, max_len).inspect_err(|e| self.report(e))?;
        load(&doc)
    }

    pub fn events(&self) -> &SharedSink {
        &self.events
    }
}

fn read_document(path: &Path, max_len: usize) -> Result<Document, LoaderError> {
    let display = path.display().to_string();
    let io = |e: std::io::Error| LoaderError::Io {
        path: display.clone(),
        reason: e.to_string(),
    };

    let len = fs::metadata(path).map_err(io)?.len();
    if len == 0 {
        return Err(LoaderError::EmptyFile { path: display });
    }
    if len > max_len as u64 {
        return Err(LoaderError::FileTooLarge {
            path: display,
            len,
            max: max_len,
        });
    }
    let text = fs::read_to_string(path).map_err(io)?;
    if text.trim().is_empty() {
        return Err(LoaderError::EmptyFile { path: display });
    }
    Document::parse(&text)
}
