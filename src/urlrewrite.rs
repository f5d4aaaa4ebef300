//! URL rewriting for replayed requests.
//!
//! Two rewrites exist: override-base-URL mode re-targets the captured
//! request at a user-supplied base (scheme, authority and path prefix),
//! and docker mode swaps the captured host for the container IP.

use crate::error::{Error, Result};
use url::Url;

/// Replace scheme, authority and leading path of `original` with
/// `base_path`, preserving the captured path, query and fragment.
pub fn replace_base_url(base_path: &str, original: &str) -> Result<String> {
    let base = Url::parse(base_path)
        .map_err(|e| Error::config(format!("invalid base path {base_path}: {e}")))?;
    let captured = Url::parse(original)
        .map_err(|e| Error::validation(format!("invalid captured URL {original}: {e}")))?;

    let mut rewritten = base.clone();
    let joined = format!("{}{}", base.path().trim_end_matches('/'), captured.path());
    rewritten.set_path(&joined);
    rewritten.set_query(captured.query());
    rewritten.set_fragment(captured.fragment());
    Ok(rewritten.into())
}

/// Replace the host of `original` with `ip`, keeping port, path and query.
pub fn replace_host_with_ip(original: &str, ip: &str) -> Result<String> {
    if ip.is_empty() {
        return Err(Error::validation("container IP is empty"));
    }
    let mut url = Url::parse(original)
        .map_err(|e| Error::validation(format!("invalid captured URL {original}: {e}")))?;
    url.set_host(Some(ip))
        .map_err(|e| Error::validation(format!("cannot set host {ip}: {e}")))?;
    Ok(url.into())
}
