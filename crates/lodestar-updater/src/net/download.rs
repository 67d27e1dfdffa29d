use crate::errors::{Result, UpdateError};
use crate::types::{DownloadProgress, ProxyRewrite};
use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = concat!("lodestar-updater/", env!("CARGO_PKG_VERSION"));
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP seam used by the resolver, the payload step and the provisioner.
pub trait Transport: Send + Sync {
    /// GET a small text body. Non-2xx is `UpdateError::Status`.
    fn get_text(&self, url: &str) -> Result<String>;

    /// Stream `url` into `dest`, returning the byte count.
    fn download_to(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<u64>;
}

/// Blocking HTTPS with rustls. Caller runs it off the UI thread.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

fn classify(url: &str, e: reqwest::Error) -> UpdateError {
    if e.is_timeout() {
        UpdateError::Timeout { url: url.to_string() }
    } else {
        UpdateError::Net(e)
    }
}

impl Transport for ReqwestTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .timeout(MANIFEST_TIMEOUT)
            .send()
            .map_err(|e| classify(url, e))?;
        check_status(url, resp.status())?;
        resp.text().map_err(|e| classify(url, e))
    }

    fn download_to(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<u64> {
        let mut resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| classify(url, e))?;
        check_status(url, resp.status())?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let total = resp.content_length();
        let mut out =
            fs::File::create(dest).with_context(|| format!("create {}", dest.display()))?;
        copy_body(url, &mut resp, &mut out, total, progress)
    }
}

fn check_status(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(UpdateError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Chunked copy with a progress report per chunk. A stalled read is a timeout.
fn copy_body(
    url: &str,
    body: &mut dyn Read,
    out: &mut dyn Write,
    total: Option<u64>,
    progress: &mut dyn FnMut(DownloadProgress),
) -> Result<u64> {
    let mut buf = vec![0u8; 128 * 1024];
    let mut downloaded = 0u64;

    loop {
        let n = match body.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                return Err(UpdateError::Timeout { url: url.to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        downloaded += n as u64;
        progress(DownloadProgress::new(total, downloaded));
    }
    out.flush()?;

    Ok(downloaded)
}

/// Replace the first matching direct segment with its proxy variant.
pub fn rewrite_to_proxy(url: &str, rewrites: &[ProxyRewrite]) -> String {
    for r in rewrites {
        if !r.direct.is_empty() && url.contains(&r.direct) {
            return url.replacen(&r.direct, &r.proxy, 1);
        }
    }
    url.to_string()
}

/// One transfer at a time; retries belong to the caller.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    rewrites: Vec<ProxyRewrite>,
    force_proxy: bool,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, rewrites: Vec<ProxyRewrite>) -> Self {
        Self {
            transport,
            rewrites,
            force_proxy: false,
        }
    }

    pub fn set_force_proxy(&mut self, on: bool) {
        self.force_proxy = on;
    }

    pub fn force_proxy(&self) -> bool {
        self.force_proxy
    }

    pub fn effective_url(&self, url: &str) -> String {
        if self.force_proxy {
            rewrite_to_proxy(url, &self.rewrites)
        } else {
            url.to_string()
        }
    }

    pub fn download(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<u64> {
        let url = self.effective_url(url);
        tracing::info!("downloading {url} -> {}", dest.display());

        let res = self.transport.download_to(&url, dest, timeout, progress);
        if res.is_err() {
            // nothing resumes from a partial file
            let _ = fs::remove_file(dest);
        }
        res
    }
}
