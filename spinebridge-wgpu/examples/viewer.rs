//! Demo viewer: resolves a skeleton's atlas, pages and JSON blob
//! through the asset resolver, uploads the pages as textures, and spins
//! them in a 3D viewport.
//!
//! By default the assets are served inline as `data:` URIs so the whole
//! resolver path (cache writes, dimension probing, eviction on exit) is
//! exercised without any files on disk. Point `SPINEBRIDGE_ASSET_DIR`
//! at a directory with `<name>.atlas`, `<name>.json` and the page
//! images to view a real export instead (`<name>` is the first CLI
//! argument, default `demo`).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use spinebridge::{
    AssetReference, AssetResolver, BundleRegistry, CancelToken, load_skeleton_assets,
};
use spinebridge_wgpu::{PageQuad, SceneRenderer, SkeletonTextures, spin_camera};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

const ATLAS: &str = "\
page.png
size: 256,256
filter: Linear, Linear
pma: false

full
  bounds: 0, 0, 256, 256
";

const SKELETON_JSON: &str = r#"
{
  "skeleton": { "spine": "4.3.00" },
  "bones": [ { "name": "root" } ],
  "slots": [ { "name": "slot0", "bone": "root", "attachment": "full" } ],
  "animations": {}
}
"#;

/// Where each reference comes from: inline data URIs or a directory of
/// real export files.
enum AssetSource {
    Inline { pages: HashMap<String, String> },
    Dir { root: PathBuf },
}

impl AssetSource {
    fn from_env() -> Self {
        if let Ok(dir) = std::env::var("SPINEBRIDGE_ASSET_DIR") {
            let root = PathBuf::from(dir);
            if root.is_dir() {
                return Self::Dir { root };
            }
            log::warn!("SPINEBRIDGE_ASSET_DIR is not a directory, using inline demo assets");
        }

        // A UV gradient makes sampling/orientation mistakes obvious.
        let size = 256u32;
        let mut img = image::RgbaImage::new(size, size);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgba([
                (x * 255 / (size - 1)) as u8,
                (y * 255 / (size - 1)) as u8,
                200,
                255,
            ]);
        }
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode demo page");

        let mut pages = HashMap::new();
        pages.insert(
            "page.png".to_string(),
            format!("data:image/png;base64,{}", BASE64.encode(&png)),
        );
        Self::Inline { pages }
    }

    fn base_name() -> String {
        std::env::args().nth(1).unwrap_or_else(|| "demo".to_string())
    }

    fn atlas_ref(&self) -> AssetReference {
        match self {
            Self::Inline { .. } => AssetReference::DataUri(format!(
                "data:text/atlas;base64,{}",
                BASE64.encode(ATLAS)
            )),
            Self::Dir { root } => file_ref(&root.join(format!("{}.atlas", Self::base_name()))),
        }
    }

    fn skeleton_ref(&self) -> AssetReference {
        match self {
            Self::Inline { .. } => AssetReference::DataUri(format!(
                "data:application/json;base64,{}",
                BASE64.encode(SKELETON_JSON)
            )),
            Self::Dir { root } => file_ref(&root.join(format!("{}.json", Self::base_name()))),
        }
    }

    fn page_ref(&self, name: &str) -> AssetReference {
        match self {
            Self::Inline { pages } => match pages.get(name) {
                Some(uri) => AssetReference::DataUri(uri.clone()),
                None => AssetReference::Module(name.to_string()),
            },
            Self::Dir { root } => file_ref(&root.join(name)),
        }
    }
}

fn file_ref(path: &std::path::Path) -> AssetReference {
    AssetReference::Local(format!("file://{}", path.display()))
}

#[derive(Default)]
struct App {
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    config: Option<wgpu::SurfaceConfiguration>,
    renderer: Option<SceneRenderer>,
    resolver: Option<AssetResolver>,
    textures: Option<SkeletonTextures>,
    quads: Vec<PageQuad>,
    angle: f32,
    last_frame: Option<Instant>,
}

impl App {
    fn teardown(&mut self) {
        if let Some(mut textures) = self.textures.take() {
            textures.dispose();
        }
        if let Some(mut resolver) = self.resolver.take() {
            resolver.cleanup();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = Arc::new(
            event_loop
                .create_window(Window::default_attributes().with_title("spinebridge viewer"))
                .unwrap(),
        );

        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).unwrap();

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            compatible_surface: Some(&surface),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }))
        .unwrap();

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: Default::default(),
        }))
        .unwrap();

        let size = window.inner_size().max(PhysicalSize::new(1, 1));
        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps.formats[0];
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut renderer = SceneRenderer::new(&device, config.format);

        // All resolution happens up front; the frame callback only
        // rotates and draws.
        let source = AssetSource::from_env();
        let cache_dir = std::env::temp_dir().join("spinebridge-viewer-cache");
        let mut resolver =
            AssetResolver::new(cache_dir, BundleRegistry::new()).expect("create cache dir");
        let assets = load_skeleton_assets(
            &mut resolver,
            &source.atlas_ref(),
            &source.skeleton_ref(),
            |name| source.page_ref(name),
            &CancelToken::new(),
        )
        .expect("load skeleton assets");
        log::info!(
            "loaded {} page(s), skeleton blob {} bytes",
            assets.pages.len(),
            assets.skeleton_json.len()
        );

        let textures = SkeletonTextures::build(&device, &queue, &assets).expect("bind pages");
        self.quads = renderer.build_quads(&device, &textures);
        let aspect = config.width.max(1) as f32 / config.height.max(1) as f32;
        renderer.set_camera(&queue, spin_camera(aspect, 0.0));

        window.request_redraw();
        self.window = Some(window);
        self.surface = Some(surface);
        self.device = Some(device);
        self.queue = Some(queue);
        self.config = Some(config);
        self.renderer = Some(renderer);
        self.resolver = Some(resolver);
        self.textures = Some(textures);
        self.last_frame = Some(Instant::now());
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                self.teardown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let (Some(surface), Some(device), Some(config)) = (
                    self.surface.as_ref(),
                    self.device.as_ref(),
                    self.config.as_mut(),
                ) else {
                    return;
                };
                config.width = size.width.max(1);
                config.height = size.height.max(1);
                surface.configure(device, config);
                window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                let (Some(surface), Some(device), Some(queue), Some(config), Some(renderer)) = (
                    self.surface.as_ref(),
                    self.device.as_ref(),
                    self.queue.as_ref(),
                    self.config.as_ref(),
                    self.renderer.as_ref(),
                ) else {
                    return;
                };

                let now = Instant::now();
                let delta = self
                    .last_frame
                    .map(|t| now.duration_since(t).as_secs_f32())
                    .unwrap_or(0.0);
                self.last_frame = Some(now);
                self.angle += delta;

                let aspect = config.width.max(1) as f32 / config.height.max(1) as f32;
                renderer.set_camera(queue, spin_camera(aspect, self.angle));

                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(_) => {
                        surface.configure(device, config);
                        return;
                    }
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());

                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("encoder"),
                });
                {
                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("render pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &view,
                            resolve_target: None,
                            depth_slice: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color {
                                    r: 0.1,
                                    g: 0.1,
                                    b: 0.12,
                                    a: 1.0,
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                    renderer.render(&mut pass, &self.quads);
                }

                queue.submit(Some(encoder.finish()));
                frame.present();
                window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() {
    env_logger::init();
    let event_loop = EventLoop::new().unwrap();
    let mut app = App::default();
    event_loop.run_app(&mut app).unwrap();
}
