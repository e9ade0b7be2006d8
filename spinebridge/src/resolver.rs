use crate::{AssetReference, BundleRegistry, BundledAsset, CancelToken, Error, ResolvedAsset};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Turns any supported [`AssetReference`] into a local file the
/// renderer-side bridge can hand to native texture upload.
///
/// Every file the resolver writes is recorded, so callers can evict the
/// whole session with [`cleanup`](Self::cleanup) or unwind a failed
/// load with [`rollback_to`](Self::rollback_to). Writers are sequential
/// by construction; there is no lock discipline to get wrong.
pub struct AssetResolver {
    cache_dir: PathBuf,
    registry: BundleRegistry,
    written: Vec<PathBuf>,
}

/// Watermark into the resolver's written-file registry.
#[derive(Copy, Clone, Debug)]
pub struct CacheMark(usize);

impl AssetResolver {
    pub fn new(cache_dir: impl Into<PathBuf>, registry: BundleRegistry) -> Result<Self, Error> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            registry,
            written: Vec::new(),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn registry(&self) -> &BundleRegistry {
        &self.registry
    }

    /// Resolves a reference to a local file. Does not probe image
    /// dimensions; see [`ensure_dimensions`](Self::ensure_dimensions).
    pub fn resolve(
        &mut self,
        reference: &AssetReference,
        cancel: &CancelToken,
    ) -> Result<ResolvedAsset, Error> {
        cancel.check()?;
        log::debug!("resolving {reference:?}");

        let asset = match reference {
            // Already local; hand it back untouched, no I/O.
            AssetReference::Local(uri) => ResolvedAsset::new(uri.clone()),
            AssetReference::DataUri(uri) => self.resolve_data_uri(uri)?,
            AssetReference::Blob(url) => {
                let data_uri = self.fetch_blob_as_data_uri(url, cancel)?;
                self.resolve_data_uri(&data_uri)?
            }
            AssetReference::Module(name) => self.resolve_module(name, cancel)?,
            AssetReference::Remote(url) => self.download(url, None, cancel)?,
        };

        cancel.check()?;
        Ok(asset)
    }

    /// Resolves a reference that must end up usable as an image:
    /// resolve, then backfill width/height from the file header.
    pub fn resolve_image(
        &mut self,
        reference: &AssetReference,
        cancel: &CancelToken,
    ) -> Result<ResolvedAsset, Error> {
        let mut asset = self.resolve(reference, cancel)?;
        self.ensure_dimensions(&mut asset)?;
        cancel.check()?;
        Ok(asset)
    }

    /// Backfills width/height by reading the image header. Must succeed
    /// before the asset is used for sizing-dependent rendering.
    pub fn ensure_dimensions(&self, asset: &mut ResolvedAsset) -> Result<(), Error> {
        if asset.width.is_some() && asset.height.is_some() {
            return Ok(());
        }
        let path = strip_file_scheme(&asset.local_path);
        let (width, height) =
            image::image_dimensions(path).map_err(|e| Error::ImageProbe {
                path: asset.local_path.clone(),
                message: e.to_string(),
            })?;
        asset.width = Some(width);
        asset.height = Some(height);
        Ok(())
    }

    /// Watermark for [`rollback_to`](Self::rollback_to).
    pub fn mark(&self) -> CacheMark {
        CacheMark(self.written.len())
    }

    /// Deletes every cache file written after `mark`.
    pub fn rollback_to(&mut self, mark: CacheMark) {
        for path in self.written.split_off(mark.0.min(self.written.len())) {
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("evicted cache entry {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("failed to evict {}: {e}", path.display()),
            }
        }
    }

    /// Deletes every cache file this resolver has written. Intended as
    /// the teardown hook for the owning component.
    pub fn cleanup(&mut self) {
        self.rollback_to(CacheMark(0));
    }

    fn resolve_data_uri(&mut self, uri: &str) -> Result<ResolvedAsset, Error> {
        let rest = uri.strip_prefix("data:").ok_or_else(|| Error::MalformedDataUri {
            message: "missing data: prefix".to_string(),
        })?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| Error::MalformedDataUri {
            message: "missing payload separator".to_string(),
        })?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| Error::MalformedDataUri {
                message: "only base64 payloads are supported".to_string(),
            })?;
        let subtype = mime
            .split_once('/')
            .map(|(_, subtype)| subtype)
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
            .ok_or_else(|| Error::MalformedDataUri {
                message: format!("unrecognized media type '{mime}'"),
            })?;
        let bytes = BASE64
            .decode(payload)
            .map_err(|e| Error::MalformedDataUri {
                message: format!("invalid base64 payload: {e}"),
            })?;

        let path = self.cache_dir.join(format!("{}.{subtype}", uuid::Uuid::new_v4()));
        fs::write(&path, &bytes)?;
        self.written.push(path.clone());
        Ok(ResolvedAsset::new(path.display().to_string()))
    }

    fn fetch_blob_as_data_uri(&self, url: &str, cancel: &CancelToken) -> Result<String, Error> {
        cancel.check()?;
        let response = ureq::get(url).call().map_err(|e| Error::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let mime = response.content_type().to_string();
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        // Re-wrap as a data URI and let the data-URI path write the
        // cache file, mirroring how blob handles reach local storage.
        Ok(wrap_as_data_uri(&mime, &bytes))
    }

    fn resolve_module(
        &mut self,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<ResolvedAsset, Error> {
        let entry = self.registry.lookup(name)?.clone();

        if !entry.uri.contains(':') {
            // Bundled-release case: the bundler left raw bytes inside
            // the installed bundle. Copy them out under a name derived
            // from the content hash so repeat resolutions are
            // idempotent.
            return self.unpack_bundled(&entry, cancel);
        }

        if entry.uri.starts_with("file:") {
            return Ok(ResolvedAsset::new(entry.uri.clone()));
        }

        self.download(&entry.uri, Some(&entry), cancel)
    }

    fn unpack_bundled(
        &mut self,
        entry: &BundledAsset,
        cancel: &CancelToken,
    ) -> Result<ResolvedAsset, Error> {
        cancel.check()?;
        let bytes = fs::read(&entry.uri)?;
        let hash = match &entry.hash {
            Some(hash) => hash.clone(),
            None => hex(&Sha256::digest(&bytes)),
        };
        let path = self.cache_dir.join(format!("asset-{hash}.{}", entry.kind));
        if !path.exists() {
            fs::write(&path, &bytes)?;
            self.written.push(path.clone());
        }
        Ok(ResolvedAsset::new(path.display().to_string()))
    }

    fn download(
        &mut self,
        url: &str,
        entry: Option<&BundledAsset>,
        cancel: &CancelToken,
    ) -> Result<ResolvedAsset, Error> {
        cancel.check()?;
        let response = ureq::get(url).call().map_err(|e| Error::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        cancel.check()?;

        let (hash, kind) = match entry {
            Some(entry) => (
                entry
                    .hash
                    .clone()
                    .unwrap_or_else(|| hex(&Sha256::digest(&bytes))),
                entry.kind.clone(),
            ),
            None => (
                hex(&Sha256::digest(url.as_bytes())),
                url_extension(url).unwrap_or_else(|| "bin".to_string()),
            ),
        };
        let path = self.cache_dir.join(format!("asset-{hash}.{kind}"));
        if !path.exists() {
            fs::write(&path, &bytes)?;
            self.written.push(path.clone());
        }
        Ok(ResolvedAsset::new(path.display().to_string()))
    }
}

fn wrap_as_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Drops a `file://` prefix so a pass-through resolved path can be used
/// with plain filesystem APIs.
pub fn strip_file_scheme(path: &str) -> &str {
    path.strip_prefix("file://").unwrap_or(path)
}

fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_string())
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BundleRegistry;
    use base64::Engine as _;

    fn resolver(dir: &Path) -> AssetResolver {
        AssetResolver::new(dir.join("cache"), BundleRegistry::new()).unwrap()
    }

    fn cache_entries(resolver: &AssetResolver) -> Vec<PathBuf> {
        let mut entries: Vec<_> = fs::read_dir(resolver.cache_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn data_uri_writes_decoded_payload_with_subtype_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());

        let payload = b"not really a png, but faithful bytes";
        let uri = format!("data:image/png;base64,{}", BASE64.encode(payload));
        let asset = resolver
            .resolve(&AssetReference::DataUri(uri), &CancelToken::new())
            .unwrap();

        let path = PathBuf::from(&asset.local_path);
        assert_eq!(path.extension().unwrap(), "png");
        assert!(path.starts_with(resolver.cache_dir()));
        assert_eq!(fs::read(&path).unwrap(), payload);
    }

    #[test]
    fn data_uri_without_base64_marker_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());

        let result = resolver.resolve(
            &AssetReference::DataUri("data:image/png,AAAA".to_string()),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(Error::MalformedDataUri { .. })));
        assert!(cache_entries(&resolver).is_empty());
    }

    #[test]
    fn data_uri_with_bad_media_type_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());

        for uri in [
            "data:;base64,AA==",
            "data:image;base64,AA==",
            "data:image/;base64,AA==",
            "data:image/../../etc;base64,AA==",
        ] {
            let result = resolver.resolve(
                &AssetReference::DataUri(uri.to_string()),
                &CancelToken::new(),
            );
            assert!(matches!(result, Err(Error::MalformedDataUri { .. })), "{uri}");
        }
    }

    #[test]
    fn file_reference_passes_through_without_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());

        let asset = resolver
            .resolve(
                &AssetReference::Local("file:///tmp/x.png".to_string()),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(asset.local_path, "file:///tmp/x.png");
        assert_eq!(asset.width, None);
        assert!(cache_entries(&resolver).is_empty());
    }

    #[test]
    fn bundled_module_resolution_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join("bundle-payload");
        fs::write(&bundled, b"page pixels").unwrap();

        let mut registry = BundleRegistry::new();
        registry.register(BundledAsset {
            name: "raptor.png".to_string(),
            uri: bundled.display().to_string(),
            hash: Some("deadbeef".to_string()),
            kind: "png".to_string(),
        });
        let mut resolver = AssetResolver::new(dir.path().join("cache"), registry).unwrap();

        let reference = AssetReference::Module("raptor.png".to_string());
        let first = resolver.resolve(&reference, &CancelToken::new()).unwrap();
        let second = resolver.resolve(&reference, &CancelToken::new()).unwrap();

        assert_eq!(first.local_path, second.local_path);
        assert!(first.local_path.ends_with("asset-deadbeef.png"));
        assert_eq!(fs::read(&first.local_path).unwrap(), b"page pixels");
        assert_eq!(cache_entries(&resolver).len(), 1);
    }

    #[test]
    fn bundled_module_without_manifest_hash_uses_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join("bundle-payload");
        fs::write(&bundled, b"page pixels").unwrap();

        let mut registry = BundleRegistry::new();
        registry.register(BundledAsset {
            name: "raptor.png".to_string(),
            uri: bundled.display().to_string(),
            hash: None,
            kind: "png".to_string(),
        });
        let mut resolver = AssetResolver::new(dir.path().join("cache"), registry).unwrap();

        let reference = AssetReference::Module("raptor.png".to_string());
        let first = resolver.resolve(&reference, &CancelToken::new()).unwrap();
        let second = resolver.resolve(&reference, &CancelToken::new()).unwrap();

        let expected = hex(&Sha256::digest(b"page pixels"));
        assert!(first.local_path.contains(&expected));
        assert_eq!(first.local_path, second.local_path);
    }

    #[test]
    fn unknown_module_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());

        let result = resolver.resolve(
            &AssetReference::Module("missing.png".to_string()),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(Error::UnknownBundleAsset { .. })));
    }

    #[test]
    fn cancelled_token_stops_resolution_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());

        let token = CancelToken::new();
        token.cancel();
        let result = resolver.resolve(
            &AssetReference::DataUri("data:image/png;base64,AA==".to_string()),
            &token,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(cache_entries(&resolver).is_empty());
    }

    #[test]
    fn rollback_removes_only_entries_after_the_mark() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());
        let token = CancelToken::new();

        let first = resolver
            .resolve(
                &AssetReference::DataUri("data:image/png;base64,AA==".to_string()),
                &token,
            )
            .unwrap();
        let mark = resolver.mark();
        let second = resolver
            .resolve(
                &AssetReference::DataUri("data:image/png;base64,AA==".to_string()),
                &token,
            )
            .unwrap();

        resolver.rollback_to(mark);
        assert!(Path::new(&first.local_path).exists());
        assert!(!Path::new(&second.local_path).exists());

        resolver.cleanup();
        assert!(!Path::new(&first.local_path).exists());
        assert!(cache_entries(&resolver).is_empty());
    }

    #[test]
    fn ensure_dimensions_probes_image_header() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());

        let path = dir.path().join("probe.png");
        image::RgbaImage::new(3, 2).save(&path).unwrap();

        let mut asset = ResolvedAsset::new(path.display().to_string());
        resolver.ensure_dimensions(&mut asset).unwrap();
        assert_eq!(asset.width, Some(3));
        assert_eq!(asset.height, Some(2));
    }

    #[test]
    fn ensure_dimensions_failure_is_a_resolution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());

        let mut asset = ResolvedAsset::new("file:///definitely/missing.png".to_string());
        assert!(matches!(
            resolver.ensure_dimensions(&mut asset),
            Err(Error::ImageProbe { .. })
        ));
    }

    /// Canned HTTP server for the fetch paths: answers `requests`
    /// connections with a PNG-typed `body`, then exits.
    fn serve_png(
        body: &'static [u8],
        requests: usize,
    ) -> (std::net::SocketAddr, std::thread::JoinHandle<()>) {
        use std::io::Write as _;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            for _ in 0..requests {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(body).unwrap();
            }
        });
        (addr, handle)
    }

    #[test]
    fn fetched_bytes_rewrap_as_a_base64_data_uri() {
        assert_eq!(
            wrap_as_data_uri("image/png", b"blob pixels"),
            format!("data:image/png;base64,{}", BASE64.encode(b"blob pixels"))
        );
    }

    #[test]
    fn blob_reference_lands_in_the_cache_via_the_data_uri_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());
        let (addr, server) = serve_png(b"blob pixels", 1);

        let asset = resolver
            .resolve(
                &AssetReference::Blob(format!("http://{addr}/handle")),
                &CancelToken::new(),
            )
            .unwrap();
        server.join().unwrap();

        // The content type becomes the cache extension and the payload
        // survives the base64 round trip.
        let path = PathBuf::from(&asset.local_path);
        assert_eq!(path.extension().unwrap(), "png");
        assert!(path.starts_with(resolver.cache_dir()));
        assert_eq!(fs::read(&path).unwrap(), b"blob pixels");
        assert_eq!(cache_entries(&resolver).len(), 1);
    }

    #[test]
    fn repeat_remote_resolution_reuses_the_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = resolver(dir.path());
        let (addr, server) = serve_png(b"remote pixels", 2);

        let reference = AssetReference::Remote(format!("http://{addr}/pages/raptor.png"));
        let token = CancelToken::new();
        let first = resolver.resolve(&reference, &token).unwrap();
        let mark = resolver.mark();
        let second = resolver.resolve(&reference, &token).unwrap();
        server.join().unwrap();

        assert_eq!(first.local_path, second.local_path);
        assert!(first.local_path.ends_with(".png"));

        // The second resolution was a cache hit, so unwinding past it
        // must not delete the file the first load still points at.
        resolver.rollback_to(mark);
        assert!(Path::new(&first.local_path).exists());
        assert_eq!(cache_entries(&resolver).len(), 1);

        resolver.cleanup();
        assert!(cache_entries(&resolver).is_empty());
    }

    #[test]
    fn url_extension_handles_queries_and_bare_names() {
        assert_eq!(
            url_extension("https://example.com/a/b/raptor.png?v=3"),
            Some("png".to_string())
        );
        assert_eq!(url_extension("https://example.com/a/b/raptor"), None);
    }
}
