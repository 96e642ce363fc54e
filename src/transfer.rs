//! The capability that moves one resource URL into one local file.
//!
//! - [`HttpTransfer`] streams the response body to disk with reqwest
//! - [`CommandTransfer`] runs an external program from a `{url}`/`{dest}` template
//!
//! Both report a plain success or failure; retrying is up to the caller.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::CrawlConfig;
use crate::fetch::{FetchError, build_transfer_client};

/// Errors raised by a single transfer attempt.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Connection, TLS or body read failure.
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus { url: String, status: u16 },

    /// Creating or writing the destination file failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The download command template has no program.
    #[error("download command template is empty")]
    EmptyCommand,

    /// The download program could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The download program exited unsuccessfully.
    #[error("'{program}' exited with {}", exit_label(.code))]
    CommandFailed { program: String, code: Option<i32> },

    /// The download program succeeded but left nothing at the destination.
    #[error("'{program}' exited successfully but did not write {}", .path.display())]
    MissingOutput { program: String, path: PathBuf },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl TransferError {
    fn network(url: &str, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            source,
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Downloads `url` into `dest`.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Performs one transfer attempt.
    async fn transfer(&self, url: &str, dest: &Path) -> Result<(), TransferError>;
}

/// Picks the configured transfer: the external command when one is set,
/// otherwise the built-in HTTP transfer.
///
/// # Errors
///
/// Returns [`FetchError::Client`] if the HTTP client cannot be built.
pub fn from_config(config: &CrawlConfig) -> Result<Box<dyn Transfer>, FetchError> {
    match &config.download_command {
        Some(template) => Ok(Box::new(CommandTransfer::new(template.clone()))),
        None => Ok(Box::new(HttpTransfer::new(config)?)),
    }
}

/// Streams response bodies straight to disk.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Client,
}

impl HttpTransfer {
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &CrawlConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_transfer_client(config)?,
        })
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn transfer(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransferError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = File::create(dest)
            .await
            .map_err(|e| TransferError::io(dest, e))?;

        match stream_to_file(&mut file, response, url, dest).await {
            Ok(bytes) => {
                debug!(bytes, "transfer complete");
                Ok(())
            }
            Err(error) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(dest).await {
                    debug!(error = %cleanup, "failed to remove partial file");
                }
                Err(error)
            }
        }
    }
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    dest: &Path,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransferError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(dest, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| TransferError::io(dest, e))?;
    Ok(bytes_written)
}

/// Runs an external download program.
///
/// The template is split on whitespace; `{url}` and `{dest}` are substituted
/// inside each argument, so values containing spaces stay a single argument.
#[derive(Debug, Clone)]
pub struct CommandTransfer {
    template: String,
}

impl CommandTransfer {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Program and arguments for one transfer.
    fn argv(&self, url: &str, dest: &Path) -> Vec<String> {
        let dest = dest.to_string_lossy();
        self.template
            .split_whitespace()
            .map(|part| part.replace("{url}", url).replace("{dest}", &dest))
            .collect()
    }
}

#[async_trait]
impl Transfer for CommandTransfer {
    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn transfer(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
        let argv = self.argv(url, dest);
        let Some((program, args)) = argv.split_first() else {
            return Err(TransferError::EmptyCommand);
        };

        let status = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| TransferError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(TransferError::CommandFailed {
                program: program.clone(),
                code: status.code(),
            });
        }

        match tokio::fs::metadata(dest).await {
            Ok(metadata) if metadata.is_file() => Ok(()),
            _ => Err(TransferError::MissingOutput {
                program: program.clone(),
                path: dest.to_path_buf(),
            }),
        }
    }
}
