//! Ordered-fallback downloads.
//!
//! A download is described by an ordered list of [`DownloadSource`]s. Each
//! source is tried over every available transport (curl, wget, then the
//! native HTTP client) and the first result that passes verification wins.
//! Content is staged next to the destination and renamed into place, so an
//! interrupted download never leaves a partial file behind.
use anyhow::{Context as _, Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::sha256_hex;
use crate::error::DownloadError;
use crate::exec::Executor;
use crate::resources::helpers::fs::{ensure_parent_dir, promote, tmp_path};

/// Number of attempts per source and transport.
const RETRY_COUNT: u32 = 2;

/// Seconds to wait between attempts.
const RETRY_DELAY: u64 = 2;

/// TCP connect timeout in seconds.
const CONNECT_TIMEOUT: u64 = 10;

/// Total transfer timeout in seconds.
const TRANSFER_TIMEOUT: u64 = 120;

/// Largest body the native client will accept.
const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// What a downloaded file must look like to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedKind {
    /// Starts with a `#!` line and contains no NUL bytes.
    ShellScript,
    /// An ELF binary or a script.
    Executable,
    /// A gzip, zip or tar archive.
    Archive,
    /// Non-empty UTF-8 without NUL bytes.
    Text,
}

impl ExpectedKind {
    /// Check `bytes` against this kind.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch.
    pub fn verify(self, bytes: &[u8]) -> Result<(), String> {
        if bytes.is_empty() {
            return Err("empty download".to_string());
        }
        let ok = match self {
            Self::ShellScript => bytes.starts_with(b"#!") && !bytes.contains(&0),
            Self::Executable => bytes.starts_with(b"\x7fELF") || bytes.starts_with(b"#!"),
            Self::Archive => {
                bytes.starts_with(&[0x1f, 0x8b])
                    || bytes.starts_with(b"PK\x03\x04")
                    || bytes.get(257..262) == Some(b"ustar".as_slice())
            }
            Self::Text => std::str::from_utf8(bytes).is_ok() && !bytes.contains(&0),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("content is not a valid {self}"))
        }
    }
}

impl fmt::Display for ExpectedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ShellScript => "shell script",
            Self::Executable => "executable",
            Self::Archive => "archive",
            Self::Text => "text file",
        })
    }
}

/// One place a file can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSource {
    /// `http(s)://` URL, `file://` URL, or absolute path.
    pub location: String,
    /// Content check applied after the fetch.
    pub expected_kind: ExpectedKind,
    /// Optional hex SHA-256 the content must match.
    pub sha256: Option<String>,
}

impl DownloadSource {
    /// Source without a pinned digest.
    #[must_use]
    pub fn new(location: impl Into<String>, expected_kind: ExpectedKind) -> Self {
        Self {
            location: location.into(),
            expected_kind,
            sha256: None,
        }
    }

    fn local_path(&self) -> Option<PathBuf> {
        if let Some(rest) = self.location.strip_prefix("file://") {
            return Some(PathBuf::from(rest));
        }
        self.location
            .starts_with('/')
            .then(|| PathBuf::from(&self.location))
    }

    fn verify(&self, bytes: &[u8]) -> Result<(), String> {
        self.expected_kind.verify(bytes)?;
        if let Some(expected) = &self.sha256 {
            let actual = sha256_hex(bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(format!("checksum mismatch (expected {expected}, got {actual})"));
            }
        }
        Ok(())
    }
}

/// How a source is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Copy from the local filesystem.
    Local,
    /// `curl` via the executor.
    Curl,
    /// `wget` via the executor.
    Wget,
    /// Built-in HTTP client.
    Native,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Curl => "curl",
            Self::Wget => "wget",
            Self::Native => "native",
        })
    }
}

/// Where a successful download came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Position of the winning source in the list.
    pub index: usize,
    /// Its location.
    pub location: String,
    /// Transport that fetched it.
    pub transport: Transport,
}

/// Try `candidates` in order and return the first success with its index.
///
/// # Errors
///
/// Returns one `"<label>: <error>"` line per failed candidate when none
/// succeeds.
pub fn try_in_order<C, T, E, F, L>(
    candidates: &[C],
    label: L,
    mut attempt: F,
) -> Result<(usize, T), Vec<String>>
where
    F: FnMut(&C) -> Result<T, E>,
    E: fmt::Display,
    L: Fn(&C) -> String,
{
    let mut failures = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        match attempt(candidate) {
            Ok(value) => return Ok((index, value)),
            Err(e) => {
                let line = format!("{}: {e}", label(candidate));
                tracing::debug!("attempt failed: {line}");
                failures.push(line);
            }
        }
    }
    Err(failures)
}

/// Fetches files through the executor's curl/wget or the native client.
#[derive(Debug)]
pub struct Downloader<'a> {
    executor: &'a dyn Executor,
    retries: u32,
    retry_delay: Duration,
    native: bool,
}

impl<'a> Downloader<'a> {
    /// Downloader with the default retry policy.
    #[must_use]
    pub const fn new(executor: &'a dyn Executor) -> Self {
        Self {
            executor,
            retries: RETRY_COUNT,
            retry_delay: Duration::from_secs(RETRY_DELAY),
            native: true,
        }
    }

    /// Override the number of attempts per transport and the delay between them.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = if retries == 0 { 1 } else { retries };
        self.retry_delay = delay;
        self
    }

    /// Disable the built-in HTTP client (only curl/wget are used).
    #[must_use]
    pub const fn without_native(mut self) -> Self {
        self.native = false;
        self
    }

    fn transports_for(&self, source: &DownloadSource) -> Vec<Transport> {
        if source.local_path().is_some() {
            return vec![Transport::Local];
        }
        let mut out = Vec::new();
        if self.executor.which("curl") {
            out.push(Transport::Curl);
        }
        if self.executor.which("wget") {
            out.push(Transport::Wget);
        }
        if self.native {
            out.push(Transport::Native);
        }
        out
    }

    /// Fetch the first source that downloads and verifies into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NoSources`] for an empty list and
    /// [`DownloadError::Exhausted`] when every source and transport failed.
    /// `dest` is untouched on error.
    pub fn fetch_first(
        &self,
        sources: &[DownloadSource],
        dest: &Path,
    ) -> Result<Fetched, DownloadError> {
        if sources.is_empty() {
            return Err(DownloadError::NoSources);
        }

        let plan: Vec<(usize, &DownloadSource, Transport)> = sources
            .iter()
            .enumerate()
            .flat_map(|(idx, source)| {
                self.transports_for(source)
                    .into_iter()
                    .map(move |t| (idx, source, t))
            })
            .collect();

        let result = try_in_order(
            &plan,
            |(_, source, transport)| format!("{} via {transport}", source.location),
            |(_, source, transport)| self.fetch_with_retries(source, *transport, dest),
        );

        match result {
            Ok((pos, ())) => {
                let (index, source, transport) = plan
                    .get(pos)
                    .map(|(i, s, t)| (*i, *s, *t))
                    .ok_or(DownloadError::NoSources)?;
                tracing::info!("downloaded {} via {transport}", source.location);
                Ok(Fetched {
                    index,
                    location: source.location.clone(),
                    transport,
                })
            }
            Err(attempts) => Err(DownloadError::Exhausted { attempts }),
        }
    }

    fn fetch_with_retries(
        &self,
        source: &DownloadSource,
        transport: Transport,
        dest: &Path,
    ) -> Result<()> {
        let mut last = None;
        for attempt in 1..=self.retries {
            if attempt > 1 {
                tracing::debug!(
                    "retry {attempt}/{} for {} after {:?}",
                    self.retries,
                    source.location,
                    self.retry_delay
                );
                std::thread::sleep(self.retry_delay);
            }
            match self.fetch_once(source, transport, dest) {
                Ok(()) => return Ok(()),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| anyhow::anyhow!("no attempt made")))
    }

    fn fetch_once(&self, source: &DownloadSource, transport: Transport, dest: &Path) -> Result<()> {
        ensure_parent_dir(dest)?;
        let staged = tmp_path(dest);
        let outcome = self
            .transfer(source, transport, &staged)
            .and_then(|()| {
                let bytes = std::fs::read(&staged)
                    .with_context(|| format!("reading {}", staged.display()))?;
                source.verify(&bytes).map_err(anyhow::Error::msg)
            });
        if let Err(e) = outcome {
            let _ = std::fs::remove_file(&staged);
            return Err(e);
        }
        promote(&staged, dest)
    }

    fn transfer(&self, source: &DownloadSource, transport: Transport, staged: &Path) -> Result<()> {
        let url = source.location.as_str();
        let staged_str = staged.to_str().context("staging path is not valid UTF-8")?;
        let connect_timeout = CONNECT_TIMEOUT.to_string();
        let transfer_timeout = TRANSFER_TIMEOUT.to_string();

        match transport {
            Transport::Local => {
                let path = source
                    .local_path()
                    .context("source is not a local path")?;
                std::fs::copy(&path, staged)
                    .with_context(|| format!("copying {}", path.display()))?;
                Ok(())
            }
            Transport::Curl => check(self.executor.run_unchecked(
                "curl",
                &[
                    "-fsSL",
                    "--connect-timeout",
                    &connect_timeout,
                    "--max-time",
                    &transfer_timeout,
                    "-o",
                    staged_str,
                    url,
                ],
            )?),
            Transport::Wget => check(self.executor.run_unchecked(
                "wget",
                &[
                    "-qO",
                    staged_str,
                    &format!("--connect-timeout={connect_timeout}"),
                    &format!("--timeout={transfer_timeout}"),
                    url,
                ],
            )?),
            Transport::Native => native_get(url, staged),
        }
    }
}

fn check(result: crate::exec::ExecResult) -> Result<()> {
    if result.success {
        return Ok(());
    }
    bail!(
        "exit {}: {}",
        result.code.unwrap_or(-1),
        result.stderr.trim()
    )
}

fn native_get(url: &str, staged: &Path) -> Result<()> {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT)))
        .timeout_global(Some(Duration::from_secs(TRANSFER_TIMEOUT)))
        .build();
    let agent = ureq::Agent::new_with_config(config);
    let mut response = agent
        .get(url)
        .call()
        .with_context(|| format!("GET {url}"))?;
    let bytes = response
        .body_mut()
        .with_config()
        .limit(MAX_DOWNLOAD_BYTES)
        .read_to_vec()
        .with_context(|| format!("reading body of {url}"))?;
    std::fs::write(staged, bytes).with_context(|| format!("writing {}", staged.display()))
}
