//! Top-level renderer.
//!
//! [`Renderer`] owns every GPU object. Fields are declared in reverse
//! creation order, so dropping it tears down per-frame state, then the
//! scene, the swapchain bundle, pipelines and passes, and finally the
//! surface and instance. Each frame it gathers draw lists, fills the frame
//! uniforms and hands a borrowed [`FrameBackend`] to the scheduler.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use translucent_core::RenderConfig;
use translucent_platform::{Surface, Window};
use translucent_resources::{FrameUniforms, Model};
use translucent_rhi::device::Device;
use translucent_rhi::instance::Instance;
use translucent_rhi::physical_device::{find_depth_format, select_physical_device};
use translucent_rhi::sampler::{Sampler, SamplerDesc};
use translucent_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain, SwapchainDesc};
use translucent_rhi::{RhiError, RhiResult};
use translucent_scene::{Aabb, Camera, MAX_POINT_LIGHTS, PointLight, lights_around};

use crate::frame::{FrameSlot, FrameSlots};
use crate::gather::DrawLists;
use crate::gpu_scene::GpuScene;
use crate::lifecycle::{ChainContext, SwapchainLifecycle};
use crate::passes::PassGraph;
use crate::pipelines::{Pipelines, SetLayouts};
use crate::recorder::{FrameInputs, record_frame};
use crate::scheduler::{FrameBackend, FrameOutcome, FrameScheduler, FrameStats};
use crate::targets::DEPTH_CANDIDATES;

/// Device-dependent settings fixed at start-up.
#[derive(Clone, Copy, Debug)]
struct Settings {
    samples: vk::SampleCountFlags,
    depth_format: vk::Format,
    image_count: u32,
    clear_color: [f32; 4],
    exposure: f32,
    gamma: f32,
    ibl_scale: f32,
}

pub struct Renderer {
    scheduler: FrameScheduler,
    draws: DrawLists,
    camera: Camera,
    lights: [PointLight; MAX_POINT_LIGHTS],
    bounds: Aabb,
    models: Vec<Model>,
    scene: GpuScene,
    frames: FrameSlots,
    chain: SwapchainLifecycle,
    pipelines: Pipelines,
    _layouts: SetLayouts,
    passes: PassGraph,
    attachment_sampler: Sampler,
    settings: Settings,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl Renderer {
    /// Creates the device, swapchain, passes and pipelines for `window` and
    /// uploads `models`.
    pub fn new(
        window: &Window,
        config: &RenderConfig,
        shader_dir: &Path,
        models: Vec<Model>,
    ) -> RhiResult<Self> {
        let (width, height) = (window.width(), window.height());
        info!("Initializing renderer ({}x{})", width, height);

        let extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(c"translucent", config.validation, &extensions)?;
        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let settings = Settings {
            samples: physical_device.usable_sample_count(config.msaa_samples),
            depth_format: find_depth_format(
                instance.handle(),
                physical_device.device,
                &DEPTH_CANDIDATES,
            )?,
            image_count: config.buffering + 1,
            clear_color: config.clear_color,
            exposure: config.exposure,
            gamma: config.gamma,
            ibl_scale: config.ibl_scale,
        };
        info!(
            "Opaque pass: {} sample(s), depth {:?}",
            settings.samples.as_raw(),
            settings.depth_format
        );

        let attachment_sampler = Sampler::new(device.clone(), SamplerDesc::attachment())?;
        let layouts = SetLayouts::new(&device)?;

        // The present pass is built for the first chain's format, so the
        // chain comes before the passes.
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.loader(),
            &SwapchainDesc {
                surface: surface.handle(),
                width,
                height,
                image_count: settings.image_count,
            },
        )?;
        let passes = PassGraph::new(
            &device,
            settings.samples,
            settings.depth_format,
            swapchain.format(),
        )?;
        let pipelines = Pipelines::new(&device, shader_dir, &layouts, &passes)?;

        let chain = {
            let ctx = chain_context(
                &instance,
                &device,
                &surface,
                &passes,
                &attachment_sampler,
                &settings,
            );
            SwapchainLifecycle::new(&ctx, &layouts.composite, swapchain, (width, height))?
        };

        let depth = config.buffering as usize;
        let frames = FrameSlots::new(&device, &layouts, depth)?;
        let scene = GpuScene::new(&device, &layouts, &models)?;

        let bounds = models
            .iter()
            .fold(Aabb::EMPTY, |bounds, model| bounds.union(&model.bounds()));
        let lights = lights_around(&bounds);
        let mut camera = Camera::new();
        camera.set_viewport(width, height);

        info!(
            "Renderer initialized: {} frames in flight, {} model(s), validation: {}",
            depth,
            models.len(),
            instance.has_validation()
        );

        Ok(Self {
            scheduler: FrameScheduler::new(depth),
            draws: DrawLists::new(),
            camera,
            lights,
            bounds,
            models,
            scene,
            frames,
            chain,
            pipelines,
            _layouts: layouts,
            passes,
            attachment_sampler,
            settings,
            device,
            surface,
            instance,
        })
    }

    /// Notes a new window size. The chain is rebuilt after the next present,
    /// or deferred while the size is zero.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.chain.set_window_size(width, height);
        self.camera.set_viewport(width, height);
        self.scheduler.request_resize();
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// World bounds of every loaded model.
    pub fn scene_bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn stats(&self) -> FrameStats {
        self.scheduler.stats()
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.chain.extent()
    }

    /// Renders and presents one frame.
    pub fn render_frame(&mut self) -> RhiResult<FrameOutcome> {
        self.draws.gather(&self.models, self.camera.position);

        let uniforms = FrameUniforms::new(
            self.camera.view_matrix(),
            self.camera.projection_matrix(),
            self.camera.position,
        )
        .with_lights(&self.lights)
        .with_tone(
            self.settings.exposure,
            self.settings.gamma,
            self.settings.ibl_scale,
        );

        let mut backend = RendererBackend {
            instance: &self.instance,
            device: &self.device,
            surface: &self.surface,
            passes: &self.passes,
            pipelines: &self.pipelines,
            attachment_sampler: &self.attachment_sampler,
            settings: &self.settings,
            chain: &mut self.chain,
            frames: &self.frames,
            scene: &self.scene,
            models: &self.models,
            draws: &self.draws,
            uniforms,
        };
        self.scheduler.run_frame(&mut backend)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
        info!(
            "Renderer destroyed after {} frames ({} skipped, {} swapchain rebuilds)",
            self.scheduler.stats().presented,
            self.scheduler.stats().skipped,
            self.scheduler.stats().recreations
        );
    }
}

fn chain_context<'a>(
    instance: &'a Instance,
    device: &'a Arc<Device>,
    surface: &'a Surface,
    passes: &'a PassGraph,
    sampler: &'a Sampler,
    settings: &Settings,
) -> ChainContext<'a> {
    ChainContext {
        instance,
        device,
        surface: surface.handle(),
        surface_loader: surface.loader(),
        passes,
        sampler,
        samples: settings.samples,
        depth_format: settings.depth_format,
        image_count: settings.image_count,
    }
}

/// The renderer's fields borrowed for one frame.
struct RendererBackend<'a> {
    instance: &'a Instance,
    device: &'a Arc<Device>,
    surface: &'a Surface,
    passes: &'a PassGraph,
    pipelines: &'a Pipelines,
    attachment_sampler: &'a Sampler,
    settings: &'a Settings,
    chain: &'a mut SwapchainLifecycle,
    frames: &'a FrameSlots,
    scene: &'a GpuScene,
    models: &'a [Model],
    draws: &'a DrawLists,
    uniforms: FrameUniforms,
}

impl RendererBackend<'_> {
    fn slot(&self, index: usize) -> RhiResult<&FrameSlot> {
        self.frames.get(index).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "frame slot {} out of range ({} slots)",
                index,
                self.frames.len()
            ))
        })
    }
}

impl FrameBackend for RendererBackend<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.in_flight().wait_forever()
    }

    fn acquire(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.slot(slot)?.image_available().handle();
        self.chain
            .resources()?
            .swapchain()
            .acquire_next_image(semaphore)
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.slot(slot)?;
        frame.in_flight().reset()?;
        frame.command_buffer().reset()?;
        frame.write_uniforms(&self.uniforms)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let frame = self.slot(slot)?;
        let inputs = FrameInputs {
            passes: self.passes,
            pipelines: self.pipelines,
            extent: self.chain.resources()?,
            composite_set: self.chain.composite_set(),
            scene: self.scene,
            models: self.models,
            draws: self.draws,
            frame_set: frame.frame_set(),
            image_index,
            clear_color: self.settings.clear_color,
        };
        record_frame(frame.command_buffer(), &inputs)
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.submit(self.device)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let semaphore = self.slot(slot)?.render_finished().handle();
        self.chain.resources()?.swapchain().present(
            self.device.present_queue(),
            image_index,
            semaphore,
        )
    }

    fn recreate(&mut self) -> RhiResult<bool> {
        let ctx = chain_context(
            self.instance,
            self.device,
            self.surface,
            self.passes,
            self.attachment_sampler,
            self.settings,
        );
        self.chain.recreate(&ctx)
    }
}
