//! Headless wgpu device used for compute work.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wgpu::Instance;

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("Request Adapter Error: {0}")]
    RequestAdapterError(#[from] wgpu::RequestAdapterError),
    #[error("Request Device Error: {0}")]
    RequestDeviceError(#[from] wgpu::RequestDeviceError),
    #[error("Buffer map error: {0}")]
    BufferMapError(#[from] wgpu::BufferAsyncError),
    #[error("Buffer build error: {0}")]
    BufferBuildError(#[from] crate::builder::BufferBuildError),
    #[error("Timed out waiting for buffer mapping")]
    MapTimeout,
    #[error("Requested {requested} bytes of voxel storage, device limit is {limit}")]
    OutOfDeviceMemory { requested: u64, limit: u64 },
}

/// Device and queue plus the adapter facts the kernel needs.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

impl GpuContext {
    /// Request a high-performance adapter and a device with its full limits.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let info = adapter.get_info();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("voxfuse"),
                required_limits: limits.clone(),
                ..Default::default()
            })
            .await?;

        info!(
            "GPU device ready: {} ({:?})",
            info.name, info.backend
        );
        debug!(
            "max storage binding {} bytes, max buffer {} bytes",
            limits.max_storage_buffer_binding_size, limits.max_buffer_size
        );

        Ok(Self {
            device,
            queue,
            info,
            limits,
        })
    }

    /// Blocking probe. Returns `None` when no usable adapter exists.
    pub fn probe() -> Option<Self> {
        match pollster::block_on(Self::new()) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                warn!("GPU probe failed: {}", err);
                None
            }
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.info.name
    }

    /// Largest storage buffer the kernel may bind.
    pub fn max_storage_bytes(&self) -> u64 {
        (self.limits.max_storage_buffer_binding_size as u64).min(self.limits.max_buffer_size)
    }

    /// Copy `size` bytes from `source` into a staging buffer and read them back.
    pub fn read_buffer<T: bytemuck::Pod>(
        &self,
        source: &wgpu::Buffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<T>, GpuError> {
        if size == 0 {
            return Ok(Vec::new());
        }

        let staging = crate::BufferBuilder::new(&self.device, "Readback Staging Buffer")
            .size(size)
            .usage(crate::BufferUsage::Staging)
            .build()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, offset, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..size);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        // Native backends only run map callbacks while the device is polled
        let start = Instant::now();
        let timeout = Duration::from_secs(5);
        loop {
            let _ = self.device.poll(wgpu::PollType::Poll);
            if let Ok(result) = receiver.try_recv() {
                result?;
                break;
            }
            if start.elapsed() > timeout {
                return Err(GpuError::MapTimeout);
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        let mapped = slice.get_mapped_range();
        let values: Vec<T> = bytemuck::cast_slice(&mapped).to_vec();
        drop(mapped);
        staging.unmap();
        Ok(values)
    }
}
