use crate::{
    AssetReference, AssetResolver, AtlasMeta, AtlasPage, CancelToken, Error, ResolvedAsset,
    strip_file_scheme,
};
use std::fs;

/// One atlas page together with its resolved, probed image file.
#[derive(Clone, Debug)]
pub struct ResolvedPage {
    pub page: AtlasPage,
    pub asset: ResolvedAsset,
}

/// Everything one skeleton needs, gathered in a single load: the atlas
/// text, the skeleton JSON blob (validated but otherwise opaque to this
/// crate), and one resolved image per atlas page.
///
/// Built once per viewer session and discarded with it; nothing is
/// cached across sessions.
#[derive(Clone, Debug)]
pub struct SkeletonAssets {
    pub atlas: AtlasMeta,
    pub atlas_text: String,
    pub skeleton_json: String,
    pub pages: Vec<ResolvedPage>,
}

/// Resolves all assets for one skeleton, all-or-nothing.
///
/// Pages are resolved strictly sequentially. They are independent, so
/// this could be parallelized, but the demo keeps the single ordered
/// walk. On any failure every cache file written during this call is
/// evicted before the error propagates.
///
/// `page_ref` maps an atlas page name (e.g. `"raptor.png"`) to the
/// reference it should be resolved from; it is injected by the caller
/// rather than looked up through any ambient loader state.
pub fn load_skeleton_assets<F>(
    resolver: &mut AssetResolver,
    atlas_ref: &AssetReference,
    skeleton_ref: &AssetReference,
    page_ref: F,
    cancel: &CancelToken,
) -> Result<SkeletonAssets, Error>
where
    F: Fn(&str) -> AssetReference,
{
    let mark = resolver.mark();
    match load_inner(resolver, atlas_ref, skeleton_ref, page_ref, cancel) {
        Ok(assets) => Ok(assets),
        Err(e) => {
            log::debug!("skeleton load failed, unwinding cache writes: {e}");
            resolver.rollback_to(mark);
            Err(e)
        }
    }
}

fn load_inner<F>(
    resolver: &mut AssetResolver,
    atlas_ref: &AssetReference,
    skeleton_ref: &AssetReference,
    page_ref: F,
    cancel: &CancelToken,
) -> Result<SkeletonAssets, Error>
where
    F: Fn(&str) -> AssetReference,
{
    let atlas_asset = resolver.resolve(atlas_ref, cancel)?;
    let atlas_text = fs::read_to_string(strip_file_scheme(&atlas_asset.local_path))?;
    let atlas = AtlasMeta::parse(&atlas_text)?;

    let mut pages = Vec::with_capacity(atlas.pages.len());
    for page in &atlas.pages {
        cancel.check()?;
        let reference = page_ref(&page.name);
        let asset = resolver.resolve_image(&reference, cancel)?;
        log::debug!(
            "page '{}' resolved to {} ({}x{})",
            page.name,
            asset.local_path,
            asset.width.unwrap_or(0),
            asset.height.unwrap_or(0)
        );
        pages.push(ResolvedPage {
            page: page.clone(),
            asset,
        });
    }

    let skeleton_asset = resolver.resolve(skeleton_ref, cancel)?;
    let skeleton_json = fs::read_to_string(strip_file_scheme(&skeleton_asset.local_path))?;
    // The blob stays opaque here; only reject content the animation
    // runtime could never parse.
    serde_json::from_str::<serde_json::Value>(&skeleton_json).map_err(|e| {
        Error::SkeletonJson {
            message: e.to_string(),
        }
    })?;

    Ok(SkeletonAssets {
        atlas,
        atlas_text,
        skeleton_json,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BundleRegistry;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use std::path::Path;

    const ATLAS: &str = "\
page0.png
size: 4,4
filter: Nearest, Nearest

r0
  bounds: 0, 0, 1, 1

page1.png
size: 8,8

r1
  bounds: 1, 1, 2, 2
";

    const SKELETON: &str = r#"{ "skeleton": { "spine": "4.3.00" }, "bones": [ { "name": "root" } ] }"#;

    fn file_ref(path: &Path) -> AssetReference {
        AssetReference::Local(format!("file://{}", path.display()))
    }

    fn write_demo_assets(dir: &Path) -> (AssetReference, AssetReference) {
        let atlas_path = dir.join("demo.atlas");
        fs::write(&atlas_path, ATLAS).unwrap();
        let skeleton_path = dir.join("demo.json");
        fs::write(&skeleton_path, SKELETON).unwrap();
        image::RgbaImage::new(4, 4).save(dir.join("page0.png")).unwrap();
        image::RgbaImage::new(8, 8).save(dir.join("page1.png")).unwrap();
        (file_ref(&atlas_path), file_ref(&skeleton_path))
    }

    #[test]
    fn loads_atlas_pages_and_skeleton_blob() {
        let dir = tempfile::tempdir().unwrap();
        let (atlas_ref, skeleton_ref) = write_demo_assets(dir.path());
        let mut resolver =
            AssetResolver::new(dir.path().join("cache"), BundleRegistry::new()).unwrap();

        let images = dir.path().to_path_buf();
        let assets = load_skeleton_assets(
            &mut resolver,
            &atlas_ref,
            &skeleton_ref,
            |name| file_ref(&images.join(name)),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(assets.atlas.pages.len(), 2);
        assert_eq!(assets.pages.len(), 2);
        assert_eq!(assets.pages[0].asset.width, Some(4));
        assert_eq!(assets.pages[1].asset.height, Some(8));
        assert_eq!(assets.skeleton_json, SKELETON);
        assert!(assets.atlas_text.contains("page1.png"));
    }

    #[test]
    fn failing_page_reference_leaves_no_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let (_, skeleton_ref) = write_demo_assets(dir.path());
        let mut resolver =
            AssetResolver::new(dir.path().join("cache"), BundleRegistry::new()).unwrap();

        // Atlas arrives as a data URI so the load writes a cache file
        // before the page resolution fails.
        let atlas_ref =
            AssetReference::DataUri(format!("data:text/atlas;base64,{}", BASE64.encode(ATLAS)));

        let result = load_skeleton_assets(
            &mut resolver,
            &atlas_ref,
            &skeleton_ref,
            |name| AssetReference::Module(name.to_string()),
            &CancelToken::new(),
        );

        assert!(matches!(result, Err(Error::UnknownBundleAsset { .. })));
        let leftovers: Vec<_> = fs::read_dir(resolver.cache_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(leftovers.is_empty(), "cache not unwound: {leftovers:?}");
    }

    #[test]
    fn invalid_skeleton_json_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let (atlas_ref, _) = write_demo_assets(dir.path());
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let mut resolver =
            AssetResolver::new(dir.path().join("cache"), BundleRegistry::new()).unwrap();

        let images = dir.path().to_path_buf();
        let result = load_skeleton_assets(
            &mut resolver,
            &atlas_ref,
            &file_ref(&broken),
            |name| file_ref(&images.join(name)),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(Error::SkeletonJson { .. })));
    }
}
