use crate::types::{LoaderError, LoaderResult};
use reqwest::blocking::Client;
use std::fs;
use std::path::Path;

/// Stream an authenticated GET response to disk.
///
/// Non-success statuses map to [`LoaderError::AssetFetch`]; partial bodies
/// never reach `dest` because the caller hands us a transient path that is
/// discarded on error.
pub fn download_to(
    http: &Client,
    url: &str,
    username: &str,
    password: &str,
    dest: &Path,
) -> LoaderResult<()> {
    log::info!("Downloading {} to {}", url, dest.display());
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut response = http
        .get(url)
        .basic_auth(username, Some(password))
        .send()?;
    if !response.status().is_success() {
        return Err(LoaderError::AssetFetch {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let mut file = fs::File::create(dest)?;
    response.copy_to(&mut file)?;
    Ok(())
}

/// Fetch a small text document (e.g. a product metadata XML) in one shot
pub fn fetch_text(
    http: &Client,
    url: &str,
    username: &str,
    password: &str,
) -> LoaderResult<String> {
    log::debug!("Fetching {}", url);
    let response = http
        .get(url)
        .basic_auth(username, Some(password))
        .send()?;
    if !response.status().is_success() {
        return Err(LoaderError::AssetFetch {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(response.text()?)
}
