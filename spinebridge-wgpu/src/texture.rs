use spinebridge::{
    AtlasPage, BlendMode, Error, ResolvedAsset, TextureDescriptor, TextureFilter, TextureWrap,
    strip_file_scheme,
};

/// Translates an atlas minification filter into wgpu's split
/// (min, mipmap) pair.
///
/// wgpu separates the in-level filter from the between-level filter, so
/// `Linear` and the two `*Nearest`-mipmap variants land on pairs with a
/// `Nearest` mipmap step. `MipMap` is the upstream alias for
/// `MipMapLinearLinear` and shares its translation; the collapse is a
/// documented narrowing, not a bug.
pub fn min_filter_modes(filter: TextureFilter) -> (wgpu::FilterMode, wgpu::FilterMode) {
    match filter {
        TextureFilter::Nearest => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest),
        TextureFilter::Linear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest),
        TextureFilter::MipMap | TextureFilter::MipMapLinearLinear => {
            (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear)
        }
        TextureFilter::MipMapNearestNearest => {
            (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest)
        }
        TextureFilter::MipMapNearestLinear => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Linear),
        TextureFilter::MipMapLinearNearest => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest),
    }
}

/// Magnification ignores the mipmap half of the variant name.
pub fn mag_filter_mode(filter: TextureFilter) -> wgpu::FilterMode {
    match filter {
        TextureFilter::Nearest
        | TextureFilter::MipMapNearestNearest
        | TextureFilter::MipMapLinearNearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear
        | TextureFilter::MipMap
        | TextureFilter::MipMapNearestLinear
        | TextureFilter::MipMapLinearLinear => wgpu::FilterMode::Linear,
    }
}

/// 1:1 wrap translation; the three variants map onto exactly the three
/// wgpu address modes.
pub fn address_mode(wrap: TextureWrap) -> wgpu::AddressMode {
    match wrap {
        TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
        TextureWrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Blend translation for material setup.
///
/// `Screen` has no fixed-function equivalent; `(One, OneMinusSrc)` is
/// an approximation to confirm against reference renders, kept explicit
/// rather than silently folded into `Normal`.
pub fn blend_state(blend: BlendMode, premultiplied_alpha: bool) -> wgpu::BlendState {
    use wgpu::{BlendComponent, BlendFactor, BlendOperation};

    let src_color = if premultiplied_alpha {
        BlendFactor::One
    } else {
        BlendFactor::SrcAlpha
    };
    let (src_color, dst) = match blend {
        BlendMode::Normal => (src_color, BlendFactor::OneMinusSrcAlpha),
        BlendMode::Additive => (src_color, BlendFactor::One),
        BlendMode::Multiply => (BlendFactor::Dst, BlendFactor::OneMinusSrcAlpha),
        BlendMode::Screen => (BlendFactor::One, BlendFactor::OneMinusSrc),
    };

    wgpu::BlendState {
        color: BlendComponent {
            src_factor: src_color,
            dst_factor: dst,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: dst,
            operation: BlendOperation::Add,
        },
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct SamplerState {
    min: wgpu::FilterMode,
    mag: wgpu::FilterMode,
    mipmap: wgpu::FilterMode,
    address_u: wgpu::AddressMode,
    address_v: wgpu::AddressMode,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            min: wgpu::FilterMode::Linear,
            mag: wgpu::FilterMode::Linear,
            mipmap: wgpu::FilterMode::Nearest,
            address_u: wgpu::AddressMode::ClampToEdge,
            address_v: wgpu::AddressMode::ClampToEdge,
        }
    }
}

fn sampler_state_for(descriptor: &TextureDescriptor) -> SamplerState {
    let (min, mipmap) = min_filter_modes(descriptor.min_filter);
    SamplerState {
        min,
        mag: mag_filter_mode(descriptor.mag_filter),
        mipmap,
        address_u: address_mode(descriptor.wrap_u),
        address_v: address_mode(descriptor.wrap_v),
    }
}

/// At-most-once release tracking, kept apart from the GPU handle so the
/// guarantee holds without a device in the picture.
#[derive(Debug, Default)]
struct DisposeGuard {
    disposed: bool,
}

impl DisposeGuard {
    /// True exactly once; every later call is a no-op.
    fn acquire(&mut self) -> bool {
        !std::mem::replace(&mut self.disposed, true)
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// A resolved atlas page uploaded to the GPU.
///
/// Composition over the renderer's texture type: the page owns its
/// `wgpu::Texture`, view and sampler, and delegates filter/wrap
/// configuration through the translations above. Image rows are
/// uploaded exactly as decoded — Spine UVs and wgpu texture space are
/// both Y-down, so no vertical flip happens anywhere.
pub struct PageTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    state: SamplerState,
    width: u32,
    height: u32,
    guard: DisposeGuard,
}

impl PageTexture {
    /// Decodes and uploads a resolved page image.
    pub fn from_resolved(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        asset: &ResolvedAsset,
    ) -> Result<Self, Error> {
        let path = strip_file_scheme(&asset.local_path);
        let bytes = std::fs::read(path)?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| Error::ImageDecode {
                path: asset.local_path.clone(),
                message: e.to_string(),
            })?
            .into_rgba8();
        let (width, height) = decoded.dimensions();

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("spinebridge page texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            texture.as_image_copy(),
            &decoded,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let state = SamplerState::default();
        let sampler = create_sampler(device, state);
        Ok(Self {
            texture,
            view,
            sampler,
            state,
            width,
            height,
            guard: DisposeGuard::default(),
        })
    }

    /// Uploads a page and configures its sampler from a full
    /// [`TextureDescriptor`]; the descriptor's blend mode belongs to
    /// material setup and is translated by [`blend_state`].
    pub fn from_descriptor(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        descriptor: &TextureDescriptor,
        asset: &ResolvedAsset,
    ) -> Result<Self, Error> {
        let mut texture = Self::from_resolved(device, queue, asset)?;
        texture.state = sampler_state_for(descriptor);
        texture.sampler = create_sampler(device, texture.state);
        Ok(texture)
    }

    /// Uploads a page and configures its sampler from the atlas page
    /// metadata in one step. Page headers carry no blend mode, so the
    /// descriptor defaults to `Normal`.
    pub fn from_page(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        page: &AtlasPage,
        asset: &ResolvedAsset,
    ) -> Result<Self, Error> {
        Self::from_descriptor(device, queue, &page.descriptor(BlendMode::Normal), asset)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn set_filters(&mut self, device: &wgpu::Device, min: TextureFilter, mag: TextureFilter) {
        let (min, mipmap) = min_filter_modes(min);
        self.state.min = min;
        self.state.mipmap = mipmap;
        self.state.mag = mag_filter_mode(mag);
        self.sampler = create_sampler(device, self.state);
    }

    pub fn set_wraps(&mut self, device: &wgpu::Device, u: TextureWrap, v: TextureWrap) {
        self.state.address_u = address_mode(u);
        self.state.address_v = address_mode(v);
        self.sampler = create_sampler(device, self.state);
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("spinebridge page bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    /// Releases the GPU texture. Safe to call more than once; only the
    /// first call destroys anything. Also runs on drop.
    pub fn dispose(&mut self) {
        if self.guard.acquire() {
            self.texture.destroy();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.guard.is_disposed()
    }
}

impl Drop for PageTexture {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn create_sampler(device: &wgpu::Device, state: SamplerState) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("spinebridge page sampler"),
        min_filter: state.min,
        mag_filter: state.mag,
        mipmap_filter: state.mipmap,
        address_mode_u: state.address_u,
        address_mode_v: state.address_v,
        ..Default::default()
    })
}
