use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

const BIN_NAME: &str = env!("CARGO_PKG_NAME");
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to download {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DownloadOutcome {
    /// Local copy is recent enough; nothing fetched.
    Fresh,
    Downloaded { bytes: u64 },
    /// The server answered with an empty body; the previous file is kept.
    Empty,
}

/// Whether `path` exists and was modified less than `max_age` before `now`.
pub fn is_fresh(path: &Path, max_age: Duration, now: SystemTime) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|meta| meta.modified()) else {
        return false;
    };
    match now.duration_since(modified) {
        Ok(age) => age < max_age,
        // Modified "in the future": clock skew, treat as fresh.
        Err(_) => true,
    }
}

/// Re-fetches the subscriber dump when the local copy is missing or older than
/// `reload_days`. Blocking; run it off the async runtime.
pub fn refresh_subscriber_file(
    path: &Path,
    url: &str,
    reload_days: u32,
    now: SystemTime,
) -> Result<DownloadOutcome, DownloadError> {
    let max_age = Duration::from_secs(u64::from(reload_days) * SECONDS_PER_DAY);
    if is_fresh(path, max_age, now) {
        return Ok(DownloadOutcome::Fresh);
    }
    download_to(path, url)
}

/// Streams `url` into `<path>.tmp`, then renames over `path`.
pub fn download_to(path: &Path, url: &str) -> Result<DownloadOutcome, DownloadError> {
    let tmp = temp_path(path);
    let result = stream_into(&tmp, url);
    let bytes = match result {
        Ok(bytes) => bytes,
        Err(error) => {
            let _ = fs::remove_file(&tmp);
            return Err(error);
        }
    };

    if bytes == 0 {
        let _ = fs::remove_file(&tmp);
        return Ok(DownloadOutcome::Empty);
    }

    fs::rename(&tmp, path).map_err(|source| DownloadError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(DownloadOutcome::Downloaded { bytes })
}

fn stream_into(tmp: &Path, url: &str) -> Result<u64, DownloadError> {
    let write_error = |source| DownloadError::Write {
        path: tmp.to_path_buf(),
        source,
    };
    if let Some(parent) = tmp.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let agent = make_agent(DOWNLOAD_TIMEOUT);
    let response = agent
        .get(url)
        .header(
            "User-Agent",
            &format!("{BIN_NAME}/{}", env!("CARGO_PKG_VERSION")),
        )
        .call()
        .map_err(|error| DownloadError::Fetch {
            url: url.to_string(),
            message: error.to_string(),
        })?;

    let mut reader = response.into_body().into_reader();
    let mut file = File::create(tmp).map_err(write_error)?;
    let bytes = io::copy(&mut reader, &mut file).map_err(|error| DownloadError::Fetch {
        url: url.to_string(),
        message: error.to_string(),
    })?;
    file.sync_all().map_err(write_error)?;
    Ok(bytes)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    config.into()
}
