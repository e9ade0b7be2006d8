use crate::Error;
use std::str::FromStr;

/// Page-header subset of the Spine atlas text format.
///
/// Regions belong to the animation runtime and are skipped here; the
/// resolver and texture adapter only need to know which page images
/// exist and how each page wants to be sampled.
#[derive(Clone, Debug)]
pub struct AtlasMeta {
    pub pages: Vec<AtlasPage>,
}

impl AtlasMeta {
    pub fn parse(input: &str) -> Result<Self, Error> {
        parse_pages(input)
    }

    pub fn page(&self, index: usize) -> Option<&AtlasPage> {
        self.pages.get(index)
    }
}

#[derive(Clone, Debug)]
pub struct AtlasPage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub pma: bool,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_u: TextureWrap,
    pub wrap_v: TextureWrap,
}

impl AtlasPage {
    /// Sampling and compositing modes for this page, paired with the
    /// blend mode the material setup selected.
    pub fn descriptor(&self, blend: BlendMode) -> TextureDescriptor {
        TextureDescriptor {
            min_filter: self.min_filter,
            mag_filter: self.mag_filter,
            wrap_u: self.wrap_u,
            wrap_v: self.wrap_v,
            blend,
        }
    }
}

/// Enumerated sampling/compositing modes, ready for 1:1 translation
/// into a renderer's native vocabulary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TextureDescriptor {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_u: TextureWrap,
    pub wrap_v: TextureWrap,
    pub blend: BlendMode,
}

/// Texture filter vocabulary of the Spine atlas format.
///
/// `MipMap` is the upstream alias for `MipMapLinearLinear`; both parse
/// and both translate to the same renderer modes. Anything outside this
/// set fails at parse time so translations stay total.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
    MipMap,
    MipMapNearestNearest,
    MipMapNearestLinear,
    MipMapLinearNearest,
    MipMapLinearLinear,
}

impl FromStr for TextureFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Nearest" => Ok(Self::Nearest),
            "Linear" => Ok(Self::Linear),
            "MipMap" => Ok(Self::MipMap),
            "MipMapNearestNearest" => Ok(Self::MipMapNearestNearest),
            "MipMapNearestLinear" => Ok(Self::MipMapNearestLinear),
            "MipMapLinearNearest" => Ok(Self::MipMapLinearNearest),
            "MipMapLinearLinear" => Ok(Self::MipMapLinearLinear),
            other => Err(Error::UnknownFilter {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TextureWrap {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

impl FromStr for TextureWrap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ClampToEdge" => Ok(Self::ClampToEdge),
            "Repeat" => Ok(Self::Repeat),
            "MirroredRepeat" => Ok(Self::MirroredRepeat),
            other => Err(Error::UnknownWrap {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

impl FromStr for BlendMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "additive" => Ok(Self::Additive),
            "multiply" => Ok(Self::Multiply),
            "screen" => Ok(Self::Screen),
            other => Err(Error::UnknownBlend {
                value: other.to_string(),
            }),
        }
    }
}

fn parse_pages(input: &str) -> Result<AtlasMeta, Error> {
    let mut pages: Vec<AtlasPage> = Vec::new();
    let mut expect_page = true;
    let mut page_has_regions = false;

    for raw_line in input.lines() {
        let raw_line = raw_line.trim_end_matches(['\r', '\n']);
        if raw_line.trim().is_empty() {
            if !pages.is_empty() && page_has_regions {
                expect_page = true;
            }
            continue;
        }

        let indented = raw_line.starts_with(' ') || raw_line.starts_with('\t');
        let line = raw_line.trim();

        if indented {
            // Region fields, not ours to interpret.
            continue;
        }

        if !line.contains(':') {
            if expect_page || pages.is_empty() {
                pages.push(AtlasPage {
                    name: line.to_string(),
                    width: 0,
                    height: 0,
                    scale: 1.0,
                    pma: false,
                    min_filter: TextureFilter::default(),
                    mag_filter: TextureFilter::default(),
                    wrap_u: TextureWrap::default(),
                    wrap_v: TextureWrap::default(),
                });
                expect_page = false;
                page_has_regions = false;
            } else {
                page_has_regions = true;
            }
            continue;
        }

        if page_has_regions {
            // Unindented `key: value` inside a region block (older
            // exports); still region data.
            continue;
        }

        let Some(page) = pages.last_mut() else {
            return Err(Error::AtlasParse {
                message: format!("page field before any page name: {line}"),
            });
        };
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "size" => {
                let (w, h) = parse_pair_u32(value).ok_or_else(|| Error::AtlasParse {
                    message: format!("invalid page size: {value}"),
                })?;
                page.width = w;
                page.height = h;
            }
            "scale" => {
                let s: f32 = value.parse().map_err(|_| Error::AtlasParse {
                    message: format!("invalid page scale: {value}"),
                })?;
                page.scale = if s.is_finite() { s } else { 1.0 };
            }
            "filter" => {
                let (min, mag) = match value.split_once(',') {
                    Some((a, b)) => (a.trim().parse()?, b.trim().parse()?),
                    None => {
                        let f: TextureFilter = value.parse()?;
                        (f, f)
                    }
                };
                page.min_filter = min;
                page.mag_filter = mag;
            }
            "repeat" => {
                let (wrap_u, wrap_v) = parse_repeat(value)?;
                page.wrap_u = wrap_u;
                page.wrap_v = wrap_v;
            }
            "pma" => {
                page.pma = matches!(value, "true");
            }
            _ => {}
        }
    }

    if pages.is_empty() {
        return Err(Error::AtlasParse {
            message: "empty atlas".to_string(),
        });
    }

    Ok(AtlasMeta { pages })
}

fn parse_pair_u32(value: &str) -> Option<(u32, u32)> {
    let (a, b) = value.split_once(',')?;
    let a = a.trim().parse().ok()?;
    let b = b.trim().parse().ok()?;
    Some((a, b))
}

fn parse_repeat(value: &str) -> Result<(TextureWrap, TextureWrap), Error> {
    match value {
        "x" => Ok((TextureWrap::Repeat, TextureWrap::ClampToEdge)),
        "y" => Ok((TextureWrap::ClampToEdge, TextureWrap::Repeat)),
        "xy" => Ok((TextureWrap::Repeat, TextureWrap::Repeat)),
        "none" => Ok((TextureWrap::ClampToEdge, TextureWrap::ClampToEdge)),
        other => Err(Error::UnknownWrap {
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_page_metadata() {
        let atlas = AtlasMeta::parse(
            r#"
raptor.png
size: 1024,512
scale: 0.5
pma: true
filter: Linear, Linear

head
  rotate: false
  xy: 0, 0
  size: 16, 8
"#,
        )
        .unwrap();

        assert_eq!(atlas.pages.len(), 1);
        let page = &atlas.pages[0];
        assert_eq!(page.name, "raptor.png");
        assert_eq!(page.width, 1024);
        assert_eq!(page.height, 512);
        assert!((page.scale - 0.5).abs() <= 1.0e-6);
        assert!(page.pma);
        assert_eq!(page.min_filter, TextureFilter::Linear);
        assert_eq!(page.mag_filter, TextureFilter::Linear);
        assert_eq!(page.wrap_u, TextureWrap::ClampToEdge);
        assert_eq!(page.wrap_v, TextureWrap::ClampToEdge);
    }

    #[test]
    fn parse_multiple_pages_ignores_regions() {
        let atlas = AtlasMeta::parse(
            r#"
page0.png
size: 32,32

r0
  bounds: 0, 0, 1, 1

page1.png
size: 64,64
filter: Nearest, Linear
repeat: xy

r1
  bounds: 2, 3, 4, 5
"#,
        )
        .unwrap();

        assert_eq!(atlas.pages.len(), 2);
        assert_eq!(atlas.pages[0].name, "page0.png");
        assert_eq!(atlas.pages[1].name, "page1.png");
        assert_eq!(atlas.pages[1].min_filter, TextureFilter::Nearest);
        assert_eq!(atlas.pages[1].mag_filter, TextureFilter::Linear);
        assert_eq!(atlas.pages[1].wrap_u, TextureWrap::Repeat);
        assert_eq!(atlas.pages[1].wrap_v, TextureWrap::Repeat);
    }

    #[test]
    fn parse_rejects_empty_atlas() {
        assert!(matches!(
            AtlasMeta::parse("\n\n"),
            Err(Error::AtlasParse { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_filter_token() {
        let result = AtlasMeta::parse(
            r#"
page.png
size: 64,64
filter: Trilinear, Linear
"#,
        );
        assert!(matches!(result, Err(Error::UnknownFilter { .. })));
    }

    #[test]
    fn parse_rejects_unknown_repeat_token() {
        let result = AtlasMeta::parse(
            r#"
page.png
size: 64,64
repeat: both
"#,
        );
        assert!(matches!(result, Err(Error::UnknownWrap { .. })));
    }

    #[test]
    fn filter_from_str_covers_declared_variants() {
        for (token, expected) in [
            ("Nearest", TextureFilter::Nearest),
            ("Linear", TextureFilter::Linear),
            ("MipMap", TextureFilter::MipMap),
            ("MipMapNearestNearest", TextureFilter::MipMapNearestNearest),
            ("MipMapNearestLinear", TextureFilter::MipMapNearestLinear),
            ("MipMapLinearNearest", TextureFilter::MipMapLinearNearest),
            ("MipMapLinearLinear", TextureFilter::MipMapLinearLinear),
        ] {
            assert_eq!(token.parse::<TextureFilter>().unwrap(), expected);
        }
        assert!("Bicubic".parse::<TextureFilter>().is_err());
    }

    #[test]
    fn blend_from_str_rejects_unknown_value() {
        assert_eq!("screen".parse::<BlendMode>().unwrap(), BlendMode::Screen);
        assert!("overlay".parse::<BlendMode>().is_err());
    }

    #[test]
    fn descriptor_carries_page_modes() {
        let atlas = AtlasMeta::parse("page.png\nsize: 8,8\nfilter: Nearest,Nearest\n").unwrap();
        let descriptor = atlas.pages[0].descriptor(BlendMode::Additive);
        assert_eq!(descriptor.min_filter, TextureFilter::Nearest);
        assert_eq!(descriptor.blend, BlendMode::Additive);
    }
}
