use sha2::{Digest, Sha256};
use url::Url;

use crate::resource::ResourceKind;

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize a locator so that trivially different spellings of the same
/// target hash identically.
///
/// The scheme is dropped (`http` and `https` collapse), the whole locator is
/// lower-cased, the fragment is removed and trailing slashes are trimmed.
/// Locators that are not absolute URLs get the same case and slash folding.
pub fn normalize_locator(locator: &str) -> String {
    let trimmed = locator.trim();
    let folded = match Url::parse(trimmed) {
        Ok(mut url) if url.has_host() => {
            url.set_fragment(None);
            let host = url.host_str().unwrap_or_default();
            let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
            let path = url.path().trim_end_matches('/');
            let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();
            format!("{host}{port}{path}{query}")
        }
        _ => trimmed.to_string(),
    };
    folded.trim_end_matches('/').to_lowercase()
}

/// Derive the stable job id of a `(kind, locator)` pair.
///
/// Two submissions for the same target always produce the same id, which is
/// what lets the queue drop duplicates.
pub fn derive_id(kind: ResourceKind, locator: &str) -> String {
    compute_hash(&format!("{}:{}", kind.as_str(), normalize_locator(locator)))
}
