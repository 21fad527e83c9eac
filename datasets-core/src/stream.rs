//! Lazy record streams over delimiter-separated files.
//!
//! The first line of a file is its header. Every following line becomes one
//! [`Record`]: the target column is set aside and converted on its own, the
//! remaining columns form the [`Features`] in header order. Columns without a
//! [`Converter`] are kept as strings.
//!
//! ```no_run
//! use datasets_core::{stream, Converter, StreamConfig};
//!
//! let config = StreamConfig::new()
//!     .with_delimiter(b'\t')
//!     .with_target("rating")
//!     .with_converter("rating", Converter::Float);
//! let ratings = stream("ml_100k.csv", config);
//! for record in ratings.iter()?.take(3) {
//!     let record = record?;
//!     println!("{:?} -> {:?}", record.features, record.target);
//! }
//! # Ok::<(), datasets_core::DatasetError>(())
//! ```
use crate::{DatasetError, Result};
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A converted field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Raw text, the result of the identity conversion.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
}

impl Value {
    /// The text, for [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    /// The integer, for [`Value::Int`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric view: floats as is, integers widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// The flag, for [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(value) => f.write_str(value),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Signature of a custom conversion.
pub type ConvertFn = dyn Fn(&str) -> std::result::Result<Value, String> + Send + Sync;

/// Turns a raw field into a [`Value`].
#[derive(Clone)]
pub enum Converter {
    /// Keep the raw text.
    Str,
    /// Parse a signed integer, surrounding whitespace allowed.
    Int,
    /// Parse a floating point number, surrounding whitespace allowed.
    Float,
    /// Parse `true`/`false`, `1`/`0` or `yes`/`no`, case insensitive.
    Bool,
    /// Any other conversion.
    Custom(Arc<ConvertFn>),
}

impl Converter {
    /// Wrap a closure as a converter.
    pub fn custom<F>(convert: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Converter::Custom(Arc::new(convert))
    }

    /// Apply the conversion to `raw`.
    pub fn convert(&self, raw: &str) -> std::result::Result<Value, String> {
        match self {
            Converter::Str => Ok(Value::Str(raw.to_string())),
            Converter::Int => raw
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|err| format!("{raw:?} is not an integer ({err})")),
            Converter::Float => raw
                .trim()
                .parse()
                .map(Value::Float)
                .map_err(|err| format!("{raw:?} is not a number ({err})")),
            Converter::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(format!("{raw:?} is not a boolean")),
            },
            Converter::Custom(convert) => convert(raw),
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Converter::Str => f.write_str("Str"),
            Converter::Int => f.write_str("Int"),
            Converter::Float => f.write_str("Float"),
            Converter::Bool => f.write_str("Bool"),
            Converter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Feature values keyed by column name, in header order.
pub type Features = IndexMap<String, Value>;

/// One parsed row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Every kept column except the target.
    pub features: Features,
    /// Converted target, `None` when the stream has no target column.
    pub target: Option<Value>,
}

/// How to read one dataset's data file.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Field separator.
    pub delimiter: u8,
    /// Column holding the value to predict.
    pub target: Option<String>,
    /// Per-column conversions; missing columns stay strings.
    pub converters: HashMap<String, Converter>,
    /// Columns left out of the features.
    pub drop: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            target: None,
            converters: HashMap::new(),
            drop: Vec::new(),
        }
    }
}

impl StreamConfig {
    /// Comma separated, no target, no conversions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the field separator.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the target column.
    pub fn with_target<S: Into<String>>(mut self, target: S) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Convert `column` with `converter`.
    pub fn with_converter<S: Into<String>>(mut self, column: S, converter: Converter) -> Self {
        self.converters.insert(column.into(), converter);
        self
    }

    /// Leave `column` out of the features.
    pub fn with_dropped<S: Into<String>>(mut self, column: S) -> Self {
        self.drop.push(column.into());
        self
    }

    fn converter(&self, column: &str) -> Converter {
        self.converters
            .get(column)
            .cloned()
            .unwrap_or(Converter::Str)
    }
}

/// A restartable record source: a data file plus the way to read it.
///
/// Creating it does no I/O. Each call to [`RecordStream::iter`] opens the
/// file again and starts from the first record.
#[derive(Debug, Clone)]
pub struct RecordStream {
    path: PathBuf,
    config: StreamConfig,
}

/// Describe a stream over `path`.
pub fn stream<P: Into<PathBuf>>(path: P, config: StreamConfig) -> RecordStream {
    RecordStream {
        path: path.into(),
        config,
    }
}

impl RecordStream {
    /// The data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The parsing configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open a new pass over the file.
    pub fn iter(&self) -> Result<Records> {
        Records::open(&self.path, &self.config)
    }
}

/// `for record in &stream` opens a new pass. A failure to open the file is
/// yielded as the only item.
impl<'a> IntoIterator for &'a RecordStream {
    type Item = Result<Record>;
    type IntoIter = Records;

    fn into_iter(self) -> Records {
        self.iter().unwrap_or_else(Records::failed)
    }
}

#[derive(Debug)]
enum Role {
    Feature,
    Target,
    Dropped,
}

#[derive(Debug)]
struct Column {
    name: String,
    role: Role,
    converter: Converter,
}

/// One pass over a data file.
///
/// Owns the file handle, which is closed as soon as the file is exhausted, a
/// row fails to parse, or the iterator is dropped. After an error the
/// iterator yields nothing more.
pub struct Records {
    rows: Option<StringRecordsIntoIter<File>>,
    columns: Vec<Column>,
    row: StringRecord,
    line: u64,
    failure: Option<DatasetError>,
}

impl fmt::Debug for Records {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records")
            .field("open", &self.rows.is_some())
            .field("columns", &self.columns)
            .field("failure", &self.failure)
            .finish()
    }
}

impl Records {
    fn open(path: &Path, config: &StreamConfig) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(config.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let header = reader.headers().map_err(|err| csv_error(err, 1))?.clone();

        if header.is_empty() {
            return Ok(Self {
                rows: None,
                columns: Vec::new(),
                row: StringRecord::new(),
                line: 1,
                failure: None,
            });
        }

        let columns: Vec<Column> = header
            .iter()
            .map(|name| {
                let role = if config.target.as_deref() == Some(name) {
                    Role::Target
                } else if config.drop.iter().any(|dropped| dropped == name) {
                    Role::Dropped
                } else {
                    Role::Feature
                };
                Column {
                    name: name.to_string(),
                    role,
                    converter: config.converter(name),
                }
            })
            .collect();

        if let Some(target) = &config.target {
            if !columns.iter().any(|column| matches!(column.role, Role::Target)) {
                return Err(DatasetError::Parse {
                    line: 1,
                    message: format!("target column {target:?} is not in the header"),
                });
            }
        }

        Ok(Self {
            rows: Some(reader.into_records()),
            columns,
            row: StringRecord::new(),
            line: 1,
            failure: None,
        })
    }

    fn failed(err: DatasetError) -> Self {
        Self {
            rows: None,
            columns: Vec::new(),
            row: StringRecord::new(),
            line: 1,
            failure: Some(err),
        }
    }

    fn build(&self, line: u64) -> Result<Record> {
        if self.row.len() != self.columns.len() {
            return Err(DatasetError::Parse {
                line,
                message: format!(
                    "expected {} fields, found {}",
                    self.columns.len(),
                    self.row.len()
                ),
            });
        }
        let mut features = Features::with_capacity(self.columns.len());
        let mut target = None;
        for (column, raw) in self.columns.iter().zip(self.row.iter()) {
            if matches!(column.role, Role::Dropped) {
                continue;
            }
            let value = column.converter.convert(raw).map_err(|message| DatasetError::Parse {
                line,
                message: format!("column {:?}: {message}", column.name),
            })?;
            match column.role {
                Role::Target => target = Some(value),
                _ => {
                    features.insert(column.name.clone(), value);
                }
            }
        }
        Ok(Record { features, target })
    }
}

impl Iterator for Records {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.failure.take() {
            return Some(Err(err));
        }
        let next = match self.rows.as_mut()?.next() {
            Some(next) => next,
            None => {
                self.rows = None;
                return None;
            }
        };
        let outcome = match next {
            Ok(row) => {
                self.line = row
                    .position()
                    .map(|position| position.line())
                    .unwrap_or(self.line + 1);
                self.row = row;
                self.build(self.line)
            }
            Err(err) => Err(csv_error(err, self.line + 1)),
        };
        if outcome.is_err() {
            self.rows = None;
        }
        Some(outcome)
    }
}

/// `fallback_line` is used when the reader cannot tell where it failed.
fn csv_error(err: csv::Error, fallback_line: u64) -> DatasetError {
    let line = err
        .position()
        .map(|position| position.line())
        .unwrap_or(fallback_line);
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(err) => DatasetError::Io(err),
        _ => DatasetError::Parse { line, message },
    }
}
