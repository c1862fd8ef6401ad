//! File bundle assembly for retrieval requests.
//!
//! The bundle comes from one of two sources. The device's own FTP server
//! is the primary one: every file its listing returns is downloaded and
//! archived under its base name. A local directory is the fallback, for
//! gateways that mirror the device's files to disk: every regular file
//! directly inside it is archived, subdirectories and other entries are
//! skipped. Either way the result is an in-memory zip archive.

use std::fs;
use std::io::{Cursor, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::FtpStream;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::BundleError;

/// Where a retrieval bundle is read from.
#[derive(Debug, Clone, PartialEq)]
pub enum BundleSource {
    Ftp(FtpSettings),
    Directory(PathBuf),
}

/// Connection details for the device's FTP server.
#[derive(Clone, PartialEq)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Remote directory to list; the login directory when unset.
    pub directory: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for FtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"********")
            .field("directory", &self.directory)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Zip named file contents, in the given order.
fn zip_entries(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, BundleError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(contents)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Zip the regular files of `dir`. Blocking; see [`build_bundle_async`].
pub fn build_bundle(dir: &Path) -> Result<Vec<u8>, BundleError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut entries = Vec::with_capacity(files.len());
    for path in &files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "Skipping file with non UTF-8 name");
            continue;
        };
        entries.push((name.to_string(), fs::read(path)?));
    }
    let bytes = zip_entries(&entries)?;

    tracing::debug!(dir = %dir.display(), files = entries.len(), size_bytes = bytes.len(), "Bundle built");
    Ok(bytes)
}

/// Download every listed file from the device's FTP server and zip them.
/// Blocking; see [`build_bundle_async`].
pub fn fetch_ftp_bundle(settings: &FtpSettings) -> Result<Vec<u8>, BundleError> {
    let addr = resolve(&settings.host, settings.port)?;
    tracing::info!(host = %settings.host, port = settings.port, "Connecting to device FTP server");
    let mut ftp = FtpStream::connect_timeout(addr, settings.timeout)?;
    ftp.login(settings.username.as_str(), settings.password.as_str())?;
    if let Some(dir) = &settings.directory {
        ftp.cwd(dir.as_str())?;
    }
    ftp.transfer_type(FileType::Binary)?;

    let mut names = ftp.nlst(None)?;
    names.sort();
    let mut entries = Vec::with_capacity(names.len());
    for listed in &names {
        let name = listed.rsplit('/').next().unwrap_or(listed.as_str());
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        let contents = ftp.retr_as_buffer(listed.as_str())?.into_inner();
        entries.push((name.to_string(), contents));
    }
    if let Err(e) = ftp.quit() {
        tracing::debug!(error = %e, "FTP QUIT failed after download");
    }

    let bytes = zip_entries(&entries)?;
    tracing::info!(
        host = %settings.host,
        files = entries.len(),
        size_bytes = bytes.len(),
        "Bundle built from device FTP"
    );
    Ok(bytes)
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, BundleError> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        BundleError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{host} did not resolve to an address"),
        ))
    })
}

/// Build the bundle from `source` on the blocking pool.
pub async fn build_bundle_async(source: Option<BundleSource>) -> Result<Vec<u8>, BundleError> {
    let source = source.ok_or(BundleError::NotConfigured)?;
    tokio::task::spawn_blocking(move || match &source {
        BundleSource::Ftp(settings) => fetch_ftp_bundle(settings),
        BundleSource::Directory(dir) => build_bundle(dir),
    })
    .await
    .map_err(|_| BundleError::Join)?
}
