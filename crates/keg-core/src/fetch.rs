//! Source archive download.
//!
//! Uses the curl crate (libcurl) with a single easy handle. The whole body is
//! kept in memory because it must be hashed before anything touches disk.

use std::time::Duration;

use crate::error::InstallError;

/// Transfer limits for one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    /// Deadline for the whole transfer.
    pub timeout: Duration,
    /// Downloads larger than this are aborted.
    pub max_bytes: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
            max_bytes: 512 * 1024 * 1024,
        }
    }
}

fn curl_err(what: &str) -> impl Fn(curl::Error) -> InstallError + '_ {
    move |e| InstallError::Network(format!("{}: {}", what, e))
}

/// Downloads `url` into memory.
///
/// Follows redirects (GitHub tag archives redirect to codeload). Any non-2xx
/// HTTP status, transport failure, deadline overrun, or a body over
/// `opts.max_bytes` is a `Network` error. `file://` URLs report status 0 and
/// are accepted.
pub fn fetch_url(url: &str, opts: &FetchOptions) -> Result<Vec<u8>, InstallError> {
    let mut body: Vec<u8> = Vec::new();
    let mut oversized = false;

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(curl_err("invalid URL"))?;
    easy.follow_location(true).map_err(curl_err("curl"))?;
    easy.max_redirections(10).map_err(curl_err("curl"))?;
    easy.useragent(concat!("keg/", env!("CARGO_PKG_VERSION")))
        .map_err(curl_err("curl"))?;
    easy.connect_timeout(opts.connect_timeout)
        .map_err(curl_err("curl"))?;
    easy.low_speed_limit(1024).map_err(curl_err("curl"))?;
    easy.low_speed_time(Duration::from_secs(60))
        .map_err(curl_err("curl"))?;
    easy.timeout(opts.timeout).map_err(curl_err("curl"))?;

    let max_bytes = opts.max_bytes;
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                if body.len() as u64 + data.len() as u64 > max_bytes {
                    oversized = true;
                    return Ok(0); // abort transfer
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(curl_err("curl"))?;
        let performed = transfer.perform();
        drop(transfer);
        if oversized {
            return Err(InstallError::Network(format!(
                "GET {} exceeded the {} byte download limit",
                url, max_bytes
            )));
        }
        performed.map_err(|e| InstallError::Network(format!("GET {} failed: {}", url, e)))?;
    }

    let code = easy
        .response_code()
        .map_err(curl_err("no response code"))?;
    if code != 0 && !(200..300).contains(&code) {
        return Err(InstallError::Network(format!(
            "GET {} returned HTTP {}",
            url, code
        )));
    }

    tracing::debug!(bytes = body.len(), "fetched {}", url);
    Ok(body)
}
