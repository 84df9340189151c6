//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// How a sampler filters and compares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerKind {
    /// Depth comparison with `LESS_OR_EQUAL` and linear filtering, for
    /// `sampler2DShadow` lookups. Returns 1.0 where the fragment is lit.
    ShadowComparison,
}

impl SamplerKind {
    pub fn create_info(self) -> vk::SamplerCreateInfo<'static> {
        match self {
            SamplerKind::ShadowComparison => vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
                .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .compare_enable(true)
                .compare_op(vk::CompareOp::LESS_OR_EQUAL)
                .min_lod(0.0)
                .max_lod(1.0)
                .max_anisotropy(1.0),
        }
    }
}

/// Vulkan sampler wrapper.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
    kind: SamplerKind,
}

impl Sampler {
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn new(device: Arc<Device>, kind: SamplerKind) -> RhiResult<Self> {
        let sampler = unsafe { device.handle().create_sampler(&kind.create_info(), None)? };

        debug!("Created {:?} sampler", kind);

        Ok(Self {
            device,
            sampler,
            kind,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    #[inline]
    pub fn kind(&self) -> SamplerKind {
        self.kind
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed {:?} sampler", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_sampler_compares_less_or_equal() {
        let info = SamplerKind::ShadowComparison.create_info();
        assert_eq!(info.compare_enable, vk::TRUE);
        assert_eq!(info.compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }

    #[test]
    fn test_sampler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Sampler>();
    }
}
