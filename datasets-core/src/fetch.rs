//! Download of dataset artifacts into the cache.
use crate::{DatasetError, Result};
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const COPY_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Opens remote byte streams.
///
/// The default implementation is [`HttpTransport`]; other implementations can
/// serve artifacts from a mirror or from memory.
pub trait Transport: Send + Sync {
    /// Start retrieving `url`. Any failure must be reported as
    /// [`DatasetError::Download`].
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>>;
}

/// Plain HTTP(S) GET, no authentication.
///
/// Holds one `reqwest` blocking client, reused for every download. Like any
/// blocking `reqwest` client, it must not be created or dropped from within
/// an async runtime.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Transport with the default [`FetcherBuilder`] settings.
    pub fn new() -> Result<Self> {
        FetcherBuilder::new().transport()
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| DatasetError::download(url, err))?;
        Ok(Box::new(response))
    }
}

/// Builder for a [`Fetcher`] backed by [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct FetcherBuilder {
    timeout: Option<Duration>,
    connect_timeout: Duration,
    user_agent: String,
    use_proxy: bool,
}

impl Default for FetcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FetcherBuilder {
    /// 10 minutes for a whole transfer, 30s to connect, proxies from the
    /// environment.
    pub fn new() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: format!("datasets-core/{}", env!("CARGO_PKG_VERSION")),
            use_proxy: true,
        }
    }

    /// Limit the whole transfer to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Let transfers run for as long as the server keeps the connection open.
    /// A server that stalls will then block the caller indefinitely.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Limit connection establishment to `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the `User-Agent` header.
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Ignore proxy settings from the environment.
    pub fn no_proxy(mut self) -> Self {
        self.use_proxy = false;
        self
    }

    fn transport(self) -> Result<HttpTransport> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(self.user_agent)
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout);
        if !self.use_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(|err| {
            DatasetError::Configuration(format!("cannot build the HTTP client: {err}"))
        })?;
        Ok(HttpTransport { client })
    }

    /// Build the HTTP client and wrap it in a [`Fetcher`].
    pub fn build(self) -> Result<Fetcher> {
        Ok(Fetcher::with_transport(self.transport()?))
    }
}

/// Downloads artifacts into the cache, at most once per destination.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

impl Fetcher {
    /// HTTP fetcher with default settings.
    pub fn new() -> Result<Self> {
        FetcherBuilder::new().build()
    }

    /// Start configuring an HTTP fetcher.
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::new()
    }

    /// Fetcher reading from a custom [`Transport`].
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Make sure `destination` exists, downloading `url` into it if it does not.
    ///
    /// An existing file is returned as is, without checking its size again.
    pub fn ensure_local(
        &self,
        url: &str,
        expected_size: Option<u64>,
        destination: &Path,
    ) -> Result<PathBuf> {
        if destination.exists() {
            debug!("Using cached {}", destination.display());
            return Ok(destination.to_path_buf());
        }
        self.fetch(url, expected_size, destination)
    }

    /// Download `url` into `destination` unconditionally.
    ///
    /// The body is written to a temporary file next to `destination` and only
    /// renamed into place once it is complete and, when `expected_size` is
    /// given, of the right length. A previous file at `destination` survives
    /// any failure.
    pub fn fetch(
        &self,
        url: &str,
        expected_size: Option<u64>,
        destination: &Path,
    ) -> Result<PathBuf> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        info!("Downloading {url} to {}", destination.display());
        let mut body = self.transport.open(url)?;
        let mut partial = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(parent)?;
        let received = copy_counted(&mut body, partial.as_file_mut(), |err| {
            DatasetError::download(url, err)
        })?;

        if let Some(expected) = expected_size {
            if received != expected {
                warn!("Discarding {url}: expected {expected} bytes, received {received}");
                return Err(DatasetError::Integrity {
                    path: destination.to_path_buf(),
                    expected,
                    actual: received,
                });
            }
        }

        partial.as_file().sync_all()?;
        partial.persist(destination).map_err(|err| err.error)?;
        info!("Downloaded {received} bytes to {}", destination.display());
        Ok(destination.to_path_buf())
    }
}

/// Copy `reader` into `writer`, returning the number of bytes moved.
///
/// Read and write failures are reported separately: reads go through
/// `on_read_error`, writes become [`DatasetError::Io`].
pub(crate) fn copy_counted<R, W, F>(reader: &mut R, writer: &mut W, on_read_error: F) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: Fn(std::io::Error) -> DatasetError,
{
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(on_read_error(err)),
        };
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
    writer.flush()?;
    Ok(total)
}
