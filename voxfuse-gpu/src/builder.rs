//! Builder for the storage, uniform and staging buffers used by compute kernels.

/// Buffer usage presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Uniform buffer, rewritable from the CPU
    Uniform,
    /// Storage buffer (read-only or read-write). Read-write buffers can also be
    /// copied from and into.
    Storage { read_only: bool },
    /// CPU-mappable readback target
    Staging,
}

impl BufferUsage {
    fn to_wgpu(self) -> wgpu::BufferUsages {
        match self {
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            BufferUsage::Storage { read_only: true } => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
            }
            BufferUsage::Storage { read_only: false } => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST
            }
            BufferUsage::Staging => wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        }
    }
}

/// Labelled buffer under construction. Defaults to a read-only storage buffer.
pub struct BufferBuilder<'a> {
    device: &'a wgpu::Device,
    label: &'a str,
    size: Option<u64>,
    contents: Option<&'a [u8]>,
    usage: BufferUsage,
}

impl<'a> BufferBuilder<'a> {
    pub fn new(device: &'a wgpu::Device, label: &'a str) -> Self {
        Self {
            device,
            label,
            size: None,
            contents: None,
            usage: BufferUsage::Storage { read_only: true },
        }
    }

    /// Byte size of an uninitialised buffer.
    pub fn size(self, size: u64) -> Self {
        Self {
            size: Some(size),
            ..self
        }
    }

    /// Initial contents, uploaded at creation.
    pub fn with_pod_data<T: bytemuck::Pod>(self, data: &'a [T]) -> Self {
        Self {
            contents: Some(bytemuck::cast_slice(data)),
            ..self
        }
    }

    pub fn usage(self, usage: BufferUsage) -> Self {
        Self { usage, ..self }
    }

    /// Build the buffer. Empty data yields a minimal zeroed buffer, since wgpu
    /// rejects zero-sized bindings.
    pub fn build(self) -> Result<wgpu::Buffer, BufferBuildError> {
        use wgpu::util::DeviceExt;

        let usage = self.usage.to_wgpu();
        if let Some(contents) = self.contents.filter(|c| !c.is_empty()) {
            let init = wgpu::util::BufferInitDescriptor {
                label: Some(self.label),
                contents,
                usage,
            };
            return Ok(self.device.create_buffer_init(&init));
        }

        let size = match (self.contents, self.size) {
            (_, Some(size)) => size,
            (Some(_), None) => 0,
            (None, None) => return Err(BufferBuildError::Unsized(self.label.to_string())),
        };
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label),
            size: wgpu::util::align_to(size.max(4), wgpu::COPY_BUFFER_ALIGNMENT),
            usage,
            mapped_at_creation: false,
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BufferBuildError {
    #[error("Buffer `{0}` needs a size or initial contents")]
    Unsized(String),
}

/// Compute-stage layout entry for a buffer binding.
pub(crate) fn compute_entry(
    binding: u32,
    ty: wgpu::BufferBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_storage_supports_copies() {
        let usage = BufferUsage::Storage { read_only: false }.to_wgpu();
        assert!(usage.contains(wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST));
        let usage = BufferUsage::Storage { read_only: true }.to_wgpu();
        assert!(!usage.contains(wgpu::BufferUsages::COPY_SRC));
    }

    #[test]
    fn test_staging_is_mappable() {
        let usage = BufferUsage::Staging.to_wgpu();
        assert!(usage.contains(wgpu::BufferUsages::MAP_READ));
        assert!(!usage.contains(wgpu::BufferUsages::STORAGE));
    }
}
