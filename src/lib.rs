#![deny(missing_docs)]
//! Remotely hosted tabular datasets, streamed one record at a time.
//!
//! A dataset is a [`RemoteDataset`] value: where the file lives, how big it
//! is, and how to parse it. The first pass downloads and unpacks the file
//! into the local cache (see [`DataHome`]); every later pass reads it from
//! there.
//!
//! ```no_run
//! use tabular_datasets::movielens100k;
//!
//! let dataset = movielens100k();
//! for record in dataset.iter()?.take(5) {
//!     let record = record?;
//!     println!("{:?} -> {:?}", record.features, record.target);
//! }
//! # Ok::<(), tabular_datasets::DatasetError>(())
//! ```
use log::info;
use std::fmt;
use std::fs;
use std::path::PathBuf;

pub use datasets_core::{
    ensure_extracted, refresh_extracted, stream, ArchiveKind, BoxError, Converter, DataHome,
    Dataset, DatasetError, Features, Fetcher, FetcherBuilder, HttpTransport, Record,
    RecordStream, Records, Result, StreamConfig, Transport, Value, DATA_HOME_ENV,
};

mod movielens;

pub use movielens::movielens100k;

/// The learning problem a dataset is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Predict a single real value.
    Regression,
    /// Predict one of two classes.
    BinaryClassification,
    /// Predict one of several classes.
    MultiClassClassification,
    /// Predict several real values.
    MultiOutputRegression,
    /// Predict several binary labels.
    MultiOutputBinaryClassification,
    /// No target, group similar records.
    Clustering,
}

impl Task {
    /// Whether records of this task carry a target.
    pub fn is_supervised(self) -> bool {
        !matches!(self, Task::Clustering)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Task::Regression => "Regression",
            Task::BinaryClassification => "Binary classification",
            Task::MultiClassClassification => "Multi-class classification",
            Task::MultiOutputRegression => "Multi-output regression",
            Task::MultiOutputBinaryClassification => "Multi-output binary classification",
            Task::Clustering => "Clustering",
        };
        f.write_str(name)
    }
}

/// A dataset hosted at a URL and cached locally.
///
/// `n_samples`, `n_features`, `n_classes` and `n_outputs` are declared
/// metadata for configuring downstream pipelines. They are never compared
/// with the content of the file.
#[derive(Debug, Clone)]
pub struct RemoteDataset {
    name: String,
    n_samples: usize,
    n_features: usize,
    n_classes: Option<usize>,
    n_outputs: Option<usize>,
    task: Task,
    url: String,
    size: Option<u64>,
    filename: String,
    unpack: bool,
    stream: StreamConfig,
    data_home: Option<DataHome>,
    fetcher: Option<Fetcher>,
}

impl RemoteDataset {
    /// Describe the dataset `name`, downloaded from `url`, whose data file
    /// is called `filename` once unpacked.
    pub fn new<N, U, F>(name: N, task: Task, url: U, filename: F) -> Self
    where
        N: Into<String>,
        U: Into<String>,
        F: Into<String>,
    {
        Self {
            name: name.into(),
            n_samples: 0,
            n_features: 0,
            n_classes: None,
            n_outputs: None,
            task,
            url: url.into(),
            size: None,
            filename: filename.into(),
            unpack: true,
            stream: StreamConfig::default(),
            data_home: None,
            fetcher: None,
        }
    }

    /// Declare the number of samples and features.
    pub fn with_shape(mut self, n_samples: usize, n_features: usize) -> Self {
        self.n_samples = n_samples;
        self.n_features = n_features;
        self
    }

    /// Declare the number of classes.
    pub fn with_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = Some(n_classes);
        self
    }

    /// Declare the number of outputs.
    pub fn with_outputs(mut self, n_outputs: usize) -> Self {
        self.n_outputs = Some(n_outputs);
        self
    }

    /// Expected size in bytes of the downloaded artifact.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// How to parse the data file.
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Store the artifact as `filename` and read it directly, even if it
    /// looks like an archive.
    pub fn without_unpack(mut self) -> Self {
        self.unpack = false;
        self
    }

    /// Cache root to use instead of the one resolved from the environment.
    pub fn with_data_home(mut self, data_home: DataHome) -> Self {
        self.data_home = Some(data_home);
        self
    }

    /// Fetcher used for downloads. Without one, an HTTP fetcher with default
    /// settings is built when a download is needed.
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Identifier of the cache entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared number of samples.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Declared number of features.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Declared number of classes, for classification tasks.
    pub fn n_classes(&self) -> Option<usize> {
        self.n_classes
    }

    /// Declared number of outputs, for multi-output tasks.
    pub fn n_outputs(&self) -> Option<usize> {
        self.n_outputs
    }

    /// Kind of learning problem.
    pub fn task(&self) -> Task {
        self.task
    }

    /// Source location.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Declared artifact size in bytes.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Name of the data file inside the cache entry.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Parsing configuration.
    pub fn stream_config(&self) -> &StreamConfig {
        &self.stream
    }

    fn data_home(&self) -> Result<DataHome> {
        match &self.data_home {
            Some(data_home) => Ok(data_home.clone()),
            None => DataHome::from_env(),
        }
    }

    /// Name under which the raw artifact is stored: the last segment of the
    /// URL, or the data file name when the artifact is used as is.
    fn artifact_name(&self) -> String {
        if !self.unpack {
            return self.filename.clone();
        }
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        match path.rsplit('/').next() {
            Some(segment) if !segment.is_empty() && segment != ".." => segment.to_string(),
            _ => format!("{}.download", self.name),
        }
    }

    /// Where the data file lives once downloaded.
    pub fn path(&self) -> Result<PathBuf> {
        self.data_home()?.path_of(&self.name, &self.filename)
    }

    /// Whether the data file is already in the cache.
    pub fn is_downloaded(&self) -> bool {
        self.path().map(|path| path.is_file()).unwrap_or(false)
    }

    /// Bring the data file into the cache and return its path.
    ///
    /// Nothing is transferred when the file is already present, unless
    /// `force` is set, in which case the artifact is fetched and unpacked
    /// again.
    ///
    /// The returned path is always [`RemoteDataset::path`]: an artifact that
    /// turns out not to be an archive is renamed to the data file name.
    pub fn download(&self, force: bool) -> Result<PathBuf> {
        let data_home = self.data_home()?;
        let dir = data_home.dataset_dir(&self.name)?;
        let data_path = data_home.path_of(&self.name, &self.filename)?;
        if !force && data_path.is_file() {
            return Ok(data_path);
        }

        let fetcher = match &self.fetcher {
            Some(fetcher) => fetcher.clone(),
            None => Fetcher::new()?,
        };
        let artifact = data_home.path_of(&self.name, &self.artifact_name())?;
        let fetched = if force {
            fetcher.fetch(&self.url, self.size, &artifact)?
        } else {
            fetcher.ensure_local(&self.url, self.size, &artifact)?
        };
        if !self.unpack {
            return Ok(fetched);
        }
        let extracted = if force {
            refresh_extracted(&fetched, &self.filename, &dir)?
        } else {
            ensure_extracted(&fetched, &self.filename, &dir)?
        };
        if extracted != data_path {
            info!("Storing {} as {}", extracted.display(), data_path.display());
            fs::rename(&extracted, &data_path)?;
        }
        Ok(data_path)
    }

    /// Start a pass over the records, downloading the dataset first if
    /// needed. Each call opens the data file afresh.
    pub fn iter(&self) -> Result<Records> {
        let path = self.download(false)?;
        stream(path, self.stream.clone()).iter()
    }
}

impl Dataset for RemoteDataset {
    type Item = Record;
    type Iter = Records;

    fn iter(&self) -> Result<Records> {
        RemoteDataset::iter(self)
    }

    fn n_samples(&self) -> usize {
        self.n_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TSV: &str = "user\titem\trating\n1\t10\t4.0\n2\t11\t3.5\n3\t12\t5.0\n";

    #[derive(Clone)]
    struct Served {
        body: Vec<u8>,
        hits: Arc<AtomicUsize>,
    }

    impl Served {
        fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                hits: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl Transport for Served {
        fn open(&self, _url: &str) -> Result<Box<dyn Read + Send>> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Cursor::new(self.body.clone())))
        }
    }

    fn ratings(home: &std::path::Path, served: &Served) -> RemoteDataset {
        RemoteDataset::new(
            "ratings",
            Task::Regression,
            "https://example.org/files/ratings.tsv?raw=1",
            "ratings.tsv",
        )
        .with_shape(3, 2)
        .with_size(served.body.len() as u64)
        .with_stream(
            StreamConfig::new()
                .with_delimiter(b'\t')
                .with_target("rating")
                .with_converter("rating", Converter::Float),
        )
        .with_data_home(DataHome::new(home))
        .with_fetcher(Fetcher::with_transport(served.clone()))
    }

    #[test]
    fn plain_file_is_downloaded_once_and_streamed_twice() {
        let scratch = tempfile::tempdir().unwrap();
        let served = Served::new(TSV.as_bytes());
        let dataset = ratings(scratch.path(), &served);
        assert!(!dataset.is_downloaded());

        let first: Vec<Record> = dataset.iter().unwrap().map(|r| r.unwrap()).collect();
        let second: Vec<Record> = dataset.iter().unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(served.hits(), 1);
        assert!(dataset.is_downloaded());
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first[1].target, Some(Value::Float(3.5)));
        assert_eq!(first[1].features["item"], Value::from("11"));
        assert_eq!(
            dataset.path().unwrap(),
            scratch.path().join("ratings").join("ratings.tsv")
        );
    }

    #[test]
    fn plain_artifact_is_stored_under_the_data_file_name() {
        let scratch = tempfile::tempdir().unwrap();
        let served = Served::new(b"x,y\n1,2\n");
        let dataset = RemoteDataset::new(
            "plain",
            Task::Regression,
            "https://example.org/download?id=3",
            "data.csv",
        )
        .with_stream(StreamConfig::new().with_target("y"))
        .with_data_home(DataHome::new(scratch.path()))
        .with_fetcher(Fetcher::with_transport(served.clone()));

        assert_eq!(dataset.iter().unwrap().count(), 1);
        let path = dataset.path().unwrap();
        assert_eq!(path, scratch.path().join("plain").join("data.csv"));
        assert!(path.is_file());
        assert!(dataset.is_downloaded());
        assert!(!scratch.path().join("plain").join("download").exists());

        assert_eq!(dataset.iter().unwrap().count(), 1);
        assert_eq!(dataset.download(true).unwrap(), path);
        assert_eq!(served.hits(), 2);
        assert_eq!(fs::read(&path).unwrap(), b"x,y\n1,2\n");
    }

    #[test]
    fn forced_download_refreshes_every_archive_member() {
        use std::io::Write;
        use zip::write::FileOptions;
        use zip::ZipWriter;

        fn archive(notes: &[u8]) -> Vec<u8> {
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
            writer.start_file("ratings.tsv", FileOptions::default()).unwrap();
            writer.write_all(TSV.as_bytes()).unwrap();
            writer.start_file("NOTES", FileOptions::default()).unwrap();
            writer.write_all(notes).unwrap();
            writer.finish().unwrap().into_inner()
        }

        let scratch = tempfile::tempdir().unwrap();
        let dataset = |served: &Served| {
            RemoteDataset::new(
                "zipped",
                Task::Regression,
                "https://example.org/zipped.zip",
                "ratings.tsv",
            )
            .with_data_home(DataHome::new(scratch.path()))
            .with_fetcher(Fetcher::with_transport(served.clone()))
        };
        let notes = scratch.path().join("zipped").join("NOTES");

        dataset(&Served::new(&archive(b"v1"))).download(false).unwrap();
        assert_eq!(fs::read(&notes).unwrap(), b"v1");

        let newer = Served::new(&archive(b"v2"));
        dataset(&newer).download(false).unwrap();
        assert_eq!(newer.hits(), 0);
        dataset(&newer).download(true).unwrap();
        assert_eq!(newer.hits(), 1);
        assert_eq!(fs::read(&notes).unwrap(), b"v2");
    }

    #[test]
    fn declared_shape_is_not_enforced() {
        let scratch = tempfile::tempdir().unwrap();
        let served = Served::new(TSV.as_bytes());
        let dataset = ratings(scratch.path(), &served).with_shape(1_000, 42);
        assert_eq!(Dataset::n_samples(&dataset), 1_000);
        assert_eq!(Dataset::iter(&dataset).unwrap().count(), 3);
    }

    #[test]
    fn wrong_size_leaves_no_cache_entry() {
        let scratch = tempfile::tempdir().unwrap();
        let served = Served::new(TSV.as_bytes());
        let dataset = ratings(scratch.path(), &served).with_size(1);

        let err = dataset.iter().unwrap_err();
        assert!(matches!(err, DatasetError::Integrity { expected: 1, .. }));
        assert!(!dataset.is_downloaded());
        let leftovers = fs::read_dir(scratch.path().join("ratings")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn forced_download_fetches_again() {
        let scratch = tempfile::tempdir().unwrap();
        let served = Served::new(TSV.as_bytes());
        let dataset = ratings(scratch.path(), &served);

        dataset.download(false).unwrap();
        dataset.download(false).unwrap();
        assert_eq!(served.hits(), 1);
        dataset.download(true).unwrap();
        assert_eq!(served.hits(), 2);
    }

    #[test]
    fn artifact_is_named_after_the_url() {
        let served = Served::new(b"");
        let dataset = ratings(std::path::Path::new("/tmp"), &served);
        assert_eq!(dataset.artifact_name(), "ratings.tsv");

        let bare = RemoteDataset::new("bare", Task::Clustering, "https://example.org/", "x.csv");
        assert_eq!(bare.artifact_name(), "bare.download");

        let raw = RemoteDataset::new("raw", Task::Clustering, "https://example.org/a.zip", "a.csv")
            .without_unpack();
        assert_eq!(raw.artifact_name(), "a.csv");
    }

    #[test]
    fn invalid_name_is_a_configuration_error() {
        let scratch = tempfile::tempdir().unwrap();
        let served = Served::new(TSV.as_bytes());
        let dataset = RemoteDataset::new("../escape", Task::Regression, "https://e.org/x", "x")
            .with_data_home(DataHome::new(scratch.path()))
            .with_fetcher(Fetcher::with_transport(served.clone()));
        assert!(matches!(
            dataset.iter(),
            Err(DatasetError::Configuration(_))
        ));
        assert_eq!(served.hits(), 0);
    }

    #[test]
    fn task_metadata() {
        assert!(Task::Regression.is_supervised());
        assert!(!Task::Clustering.is_supervised());
        assert_eq!(
            Task::MultiClassClassification.to_string(),
            "Multi-class classification"
        );
    }
}
