//! Proxy target decoding, allow-listing and canonicalization
//!
//! Clients pass the upstream URL base64url-encoded in `?u=`. Only URLs on the
//! configured upstream origin under the configured path prefix are accepted.
//! Accepted URLs are canonicalized so equivalent requests share one cache
//! entry and one in-flight upstream call.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bib_common::config::CatalogConfig;
use bib_common::Error;
use thiserror::Error;
use url::Url;

/// Longest accepted `u` parameter
const MAX_ENCODED_LEN: usize = 4096;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    /// `u` is not valid base64url / UTF-8 / absolute URL
    #[error("malformed target: {0}")]
    Malformed(String),

    /// Well-formed URL outside the allowed upstream
    #[error("target not allowed: {0}")]
    Disallowed(String),
}

/// Allowed upstream and canonicalization rules
#[derive(Debug, Clone)]
pub struct UpstreamPolicy {
    base: Url,
    path_prefix: String,
    strip_params: Vec<String>,
}

impl UpstreamPolicy {
    pub fn new(config: &CatalogConfig) -> bib_common::Result<Self> {
        let base = Url::parse(&config.upstream_base).map_err(|e| {
            Error::Config(format!(
                "catalog.upstream_base {:?} is not a URL: {}",
                config.upstream_base, e
            ))
        })?;

        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(Error::Config(format!(
                "catalog.upstream_base must be an http(s) origin: {}",
                config.upstream_base
            )));
        }

        Ok(Self {
            base,
            path_prefix: config.path_prefix.clone(),
            strip_params: config.strip_params.clone(),
        })
    }

    /// Decode, allow-list and canonicalize a `u` parameter
    pub fn resolve(&self, encoded: &str) -> Result<Url, TargetError> {
        let url = decode_target(encoded)?;
        self.check(&url)?;
        Ok(self.canonicalize(&url))
    }

    /// Reject anything outside the configured origin and path prefix
    pub fn check(&self, url: &Url) -> Result<(), TargetError> {
        if url.scheme() != self.base.scheme() {
            return Err(TargetError::Disallowed(format!("scheme {}", url.scheme())));
        }
        if url.host_str() != self.base.host_str() {
            return Err(TargetError::Disallowed(format!(
                "host {}",
                url.host_str().unwrap_or("")
            )));
        }
        if url.port_or_known_default() != self.base.port_or_known_default() {
            return Err(TargetError::Disallowed("port".to_string()));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(TargetError::Disallowed("credentials in URL".to_string()));
        }
        // The parser has already resolved dot segments, so a prefix match
        // cannot be escaped with `/3/../`.
        if !url.path().starts_with(&self.path_prefix) {
            return Err(TargetError::Disallowed(format!("path {}", url.path())));
        }
        Ok(())
    }

    /// Drop the fragment and stripped parameters, sort the rest.
    /// A valueless parameter (`?adult`) is emitted as `adult=`, so both
    /// spellings share one canonical URL.
    pub fn canonicalize(&self, url: &Url) -> Url {
        let mut canonical = url.clone();
        canonical.set_fragment(None);

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !self.strip_params.iter().any(|s| s == key.as_ref()))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        pairs.sort();

        if pairs.is_empty() {
            canonical.set_query(None);
        } else {
            canonical.query_pairs_mut().clear().extend_pairs(pairs);
        }
        canonical
    }
}

/// base64url (padding optional) → UTF-8 → absolute URL
pub fn decode_target(encoded: &str) -> Result<Url, TargetError> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(TargetError::Malformed("empty".to_string()));
    }
    if encoded.len() > MAX_ENCODED_LEN {
        return Err(TargetError::Malformed("too long".to_string()));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| TargetError::Malformed(format!("base64url: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| TargetError::Malformed("not UTF-8".to_string()))?;

    Url::parse(&text).map_err(|e| TargetError::Malformed(format!("url: {}", e)))
}

/// Path and query of a canonical URL; the edge cache key
pub fn cache_key(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
