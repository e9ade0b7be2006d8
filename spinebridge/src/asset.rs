use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One asset reference, classified by its scheme. Immutable once built.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AssetReference {
    /// A name registered in the [`BundleRegistry`] (e.g. `"raptor.png"`).
    Module(String),
    /// A `file:` URI. Already local; the resolver passes it through.
    Local(String),
    /// A `blob:` URL served by the host platform's blob store.
    Blob(String),
    /// An inline `data:<mime>/<subtype>;base64,<payload>` URI.
    DataUri(String),
    /// An `http:`/`https:` URL.
    Remote(String),
}

impl AssetReference {
    /// Classifies a string-form reference by scheme. Strings without a
    /// scheme are treated as bundle module names; unknown schemes are
    /// rejected rather than guessed at.
    pub fn parse(input: &str) -> Result<Self, Error> {
        if input.starts_with("file:") {
            return Ok(Self::Local(input.to_string()));
        }
        if input.starts_with("blob:") {
            return Ok(Self::Blob(input.to_string()));
        }
        if input.starts_with("data:") {
            return Ok(Self::DataUri(input.to_string()));
        }
        if input.starts_with("http:") || input.starts_with("https:") {
            return Ok(Self::Remote(input.to_string()));
        }
        if let Some((scheme, _)) = input.split_once(':') {
            // Single letters are drive prefixes, not URI schemes.
            if scheme.len() >= 2 && scheme.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::UnsupportedScheme {
                    uri: input.to_string(),
                });
            }
        }
        Ok(Self::Module(input.to_string()))
    }
}

/// A reference the resolver has turned into a local file.
///
/// Width and height are backfilled by probing the image when the source
/// does not declare them; both are present before the asset is used for
/// sizing-dependent rendering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedAsset {
    pub local_path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ResolvedAsset {
    pub fn new(local_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            width: None,
            height: None,
        }
    }
}

/// One entry of the bundle manifest: where the bundler placed an asset
/// and what it declared about it.
#[derive(Clone, Debug)]
pub struct BundledAsset {
    pub name: String,
    /// Bundler-resolved location. A value without a scheme is a raw
    /// path inside the installed bundle (release builds); a value with
    /// a scheme is downloadable.
    pub uri: String,
    /// Content hash from the bundler manifest, when it provides one.
    pub hash: Option<String>,
    /// Declared type, used as the cache file extension (e.g. `"png"`).
    pub kind: String,
}

/// Explicit module-name → bundled-asset map, injected into the
/// resolver. There is deliberately no ambient global registry.
#[derive(Clone, Debug, Default)]
pub struct BundleRegistry {
    entries: HashMap<String, BundledAsset>,
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, asset: BundledAsset) {
        self.entries.insert(asset.name.clone(), asset);
    }

    pub fn lookup(&self, name: &str) -> Result<&BundledAsset, Error> {
        self.entries.get(name).ok_or_else(|| Error::UnknownBundleAsset {
            name: name.to_string(),
        })
    }
}

/// Cooperative cancellation flag for in-flight resolutions.
///
/// The resolver checks the token before every suspension point and
/// before handing results back, so a caller that goes away can stop the
/// work it requested instead of leaking it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classifies_by_scheme() {
        assert_eq!(
            AssetReference::parse("file:///tmp/x.png").unwrap(),
            AssetReference::Local("file:///tmp/x.png".to_string())
        );
        assert_eq!(
            AssetReference::parse("blob:abc-123").unwrap(),
            AssetReference::Blob("blob:abc-123".to_string())
        );
        assert_eq!(
            AssetReference::parse("data:image/png;base64,AA==").unwrap(),
            AssetReference::DataUri("data:image/png;base64,AA==".to_string())
        );
        assert_eq!(
            AssetReference::parse("https://example.com/a.png").unwrap(),
            AssetReference::Remote("https://example.com/a.png".to_string())
        );
        assert_eq!(
            AssetReference::parse("raptor.png").unwrap(),
            AssetReference::Module("raptor.png".to_string())
        );
    }

    #[test]
    fn parse_rejects_unknown_scheme() {
        assert!(matches!(
            AssetReference::parse("ftp://example.com/a.png"),
            Err(Error::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn windows_style_paths_are_not_schemes() {
        // A single drive letter before ':' is not an URI scheme.
        assert!(matches!(
            AssetReference::parse("C:/assets/x.png"),
            Ok(AssetReference::Module(_))
        ));
    }

    #[test]
    fn registry_lookup_unknown_name_fails() {
        let registry = BundleRegistry::new();
        assert!(matches!(
            registry.lookup("missing.png"),
            Err(Error::UnknownBundleAsset { .. })
        ));
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
