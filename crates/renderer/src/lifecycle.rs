//! Swapchain lifecycle.
//!
//! Everything sized to the presentation extent lives in one
//! [`ExtentResources`] bundle: the chain, the render targets and the
//! framebuffers of all three passes. A rebuild drops the whole bundle and
//! creates a new one; field order makes the teardown run framebuffers first,
//! then targets, then the chain.
//!
//! A zero-area surface (a minimized window) does not block the caller until
//! it grows again. [`SwapchainLifecycle::recreate`] returns `Ok(false)`,
//! keeps the old bundle, and the lifecycle stays in
//! [`LifecycleState::RecreatePending`]; the frame scheduler retries the
//! rebuild at the start of each frame and reports those frames as deferred.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use translucent_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, sampled_image, write_combined_images,
};
use translucent_rhi::device::Device;
use translucent_rhi::framebuffer::Framebuffer;
use translucent_rhi::instance::Instance;
use translucent_rhi::sampler::Sampler;
use translucent_rhi::swapchain::{Swapchain, SwapchainDesc, current_surface_extent};
use translucent_rhi::{RhiError, RhiResult};

use crate::passes::PassGraph;
use crate::targets::{RenderTargets, TargetDescs};

/// Framebuffers of the three passes for one extent.
pub struct Framebuffers {
    present: Vec<Framebuffer>,
    transparency: Framebuffer,
    opaque: Framebuffer,
}

impl Framebuffers {
    pub fn new(
        device: &Arc<Device>,
        passes: &PassGraph,
        targets: &RenderTargets,
        swapchain: &Swapchain,
    ) -> RhiResult<Self> {
        let extent = targets.extent();
        let opaque = Framebuffer::new(device.clone(), passes.opaque(), &targets.opaque_views(), extent)?;
        let transparency = Framebuffer::new(
            device.clone(),
            passes.transparency(),
            &targets.transparency_views(),
            extent,
        )?;
        let present = swapchain
            .image_views()
            .iter()
            .map(|&view| Framebuffer::new(device.clone(), passes.present(), &[view], swapchain.extent()))
            .collect::<RhiResult<Vec<_>>>()?;

        debug!("Created {} present framebuffers", present.len());

        Ok(Self {
            present,
            transparency,
            opaque,
        })
    }

    #[inline]
    pub fn opaque(&self) -> &Framebuffer {
        &self.opaque
    }

    #[inline]
    pub fn transparency(&self) -> &Framebuffer {
        &self.transparency
    }

    /// Framebuffer targeting presentable image `image_index`.
    pub fn present(&self, image_index: u32) -> RhiResult<&Framebuffer> {
        self.present.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "no present framebuffer for image {} ({} images)",
                image_index,
                self.present.len()
            ))
        })
    }
}

/// Everything that has to be rebuilt when the extent changes.
pub struct ExtentResources {
    framebuffers: Framebuffers,
    targets: RenderTargets,
    swapchain: Swapchain,
}

impl ExtentResources {
    #[inline]
    pub fn framebuffers(&self) -> &Framebuffers {
        &self.framebuffers
    }

    #[inline]
    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }
}

/// Long-lived objects a rebuild needs, borrowed from the renderer.
pub struct ChainContext<'a> {
    pub instance: &'a Instance,
    pub device: &'a Arc<Device>,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub passes: &'a PassGraph,
    /// Sampler for the composite inputs.
    pub sampler: &'a Sampler,
    pub samples: vk::SampleCountFlags,
    pub depth_format: vk::Format,
    /// Preferred number of presentable images.
    pub image_count: u32,
}

impl ChainContext<'_> {
    /// Creates a chain for the given window size.
    pub fn create_swapchain(&self, width: u32, height: u32) -> RhiResult<Swapchain> {
        Swapchain::new(
            self.instance,
            self.device.clone(),
            self.surface_loader,
            &SwapchainDesc {
                surface: self.surface,
                width,
                height,
                image_count: self.image_count,
            },
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Ready,
    /// The surface had zero area at the last rebuild attempt; the old
    /// resources are still alive and nothing should be presented.
    RecreatePending,
}

pub struct SwapchainLifecycle {
    resources: Option<ExtentResources>,
    composite_set: vk::DescriptorSet,
    _composite_pool: DescriptorPool,
    window_size: (u32, u32),
    state: LifecycleState,
    generation: u64,
}

impl SwapchainLifecycle {
    /// Builds targets and framebuffers around an existing chain. The chain
    /// has to be created first because the present pass depends on its
    /// format.
    pub fn new(
        ctx: &ChainContext<'_>,
        composite_layout: &DescriptorSetLayout,
        swapchain: Swapchain,
        window_size: (u32, u32),
    ) -> RhiResult<Self> {
        let composite_pool = DescriptorPool::for_layout(ctx.device.clone(), composite_layout, 1)?;
        let composite_set = composite_pool
            .allocate(composite_layout, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("composite descriptor set".to_string()))?;

        let resources = build_extent_resources(ctx, swapchain)?;
        write_composite_set(ctx, composite_set, &resources.targets);

        Ok(Self {
            resources: Some(resources),
            composite_set,
            _composite_pool: composite_pool,
            window_size,
            state: LifecycleState::Ready,
            generation: 0,
        })
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Number of completed rebuilds.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    /// Records the latest window size, used when the surface lets us pick
    /// the extent.
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
    }

    /// Descriptor set sampling the composite inputs of the current extent.
    #[inline]
    pub fn composite_set(&self) -> vk::DescriptorSet {
        self.composite_set
    }

    pub fn resources(&self) -> RhiResult<&ExtentResources> {
        self.resources
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("no swapchain (rebuild failed)".to_string()))
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.resources.as_ref().map(|r| r.swapchain.extent())
    }

    /// Rebuilds every extent-dependent resource.
    ///
    /// Returns `Ok(false)` without touching anything when the surface has
    /// zero area; call again once the window is restored.
    pub fn recreate(&mut self, ctx: &ChainContext<'_>) -> RhiResult<bool> {
        ctx.device.wait_idle()?;

        let (width, height) = self.window_size;
        let Some(extent) = current_surface_extent(
            ctx.device.physical_device(),
            ctx.surface,
            ctx.surface_loader,
            width,
            height,
        )?
        else {
            self.state = LifecycleState::RecreatePending;
            return Ok(false);
        };

        // The old chain must be gone before a new one is created for the
        // same surface.
        self.resources = None;

        let swapchain = ctx.create_swapchain(extent.width, extent.height)?;
        check_present_format(ctx.passes.present_format(), swapchain.format())?;
        let resources = build_extent_resources(ctx, swapchain)?;
        write_composite_set(ctx, self.composite_set, &resources.targets);

        self.resources = Some(resources);
        self.state = LifecycleState::Ready;
        self.generation += 1;

        info!(
            "Swapchain rebuilt at {}x{} (generation {})",
            extent.width, extent.height, self.generation
        );
        Ok(true)
    }
}

fn build_extent_resources(ctx: &ChainContext<'_>, swapchain: Swapchain) -> RhiResult<ExtentResources> {
    let descs = TargetDescs::new(swapchain.extent(), ctx.samples, ctx.depth_format);
    let targets = RenderTargets::new(ctx.device, descs)?;
    let framebuffers = Framebuffers::new(ctx.device, ctx.passes, &targets, &swapchain)?;
    Ok(ExtentResources {
        framebuffers,
        targets,
        swapchain,
    })
}

/// Points the composite set at the opaque color, accumulation and
/// revealage targets.
fn write_composite_set(ctx: &ChainContext<'_>, set: vk::DescriptorSet, targets: &RenderTargets) {
    let sampler = ctx.sampler.handle();
    write_combined_images(
        ctx.device,
        set,
        0,
        &[
            sampled_image(sampler, targets.color().view()),
            sampled_image(sampler, targets.accum().view()),
            sampled_image(sampler, targets.reveal().view()),
        ],
    );
}

/// The present pass and its pipeline are built once for the first chain's
/// format; a rebuilt chain has to match it.
pub fn check_present_format(expected: vk::Format, actual: vk::Format) -> RhiResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RhiError::SwapchainError(format!(
            "surface format changed from {:?} to {:?}",
            expected, actual
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_format_must_match() {
        assert!(check_present_format(vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_SRGB).is_ok());
        let err = check_present_format(vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_UNORM)
            .unwrap_err();
        assert!(matches!(err, RhiError::SwapchainError(_)));
    }

    #[test]
    fn test_extent_resources_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Framebuffers>();
        assert_send::<ExtentResources>();
        assert_send::<SwapchainLifecycle>();
    }
}
