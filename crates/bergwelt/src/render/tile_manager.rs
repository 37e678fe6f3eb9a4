use std::collections::HashSet;
use std::sync::Arc;

use cgmath::Vector2;
use once_cell::sync::Lazy;

use crate::decode::N_EDGE_VERTICES;
use crate::dynamics::Camera;
use crate::render::{surface_quads_with_curtains, LayerPool};
use crate::tile::{AabbDecorator, GpuTileQuad, TileId};
use wgpu::util::DeviceExt;

/// Strip indices are identical for every tile; generate them once.
static TILE_STRIP_INDICES: Lazy<Vec<u16>> =
    Lazy::new(|| surface_quads_with_curtains(N_EDGE_VERTICES));

pub const ORTHO_RESOLUTION: u32 = 256;
pub const DEFAULT_GPU_QUAD_LIMIT: usize = 512;

/// One backing pair of array textures plus the bind group that exposes
/// them. Several sets exist when the desired layer count exceeds the
/// device's array-layer limit; draws are then partitioned per set.
struct ArraySet {
    ortho: wgpu::Texture,
    height: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// Owns the GPU residency of tiles: bounded ortho/height array textures,
/// the shared tile index buffer and the per-instance vertex buffers.
/// Render-thread only; the worker never touches it.
pub struct TileManager {
    pool: LayerPool,
    arrays: Vec<ArraySet>,
    layers_per_array: u32,
    quad_limit: usize,

    index_buffer: wgpu::Buffer,
    index_count: u32,

    instance_bounds: wgpu::Buffer,
    instance_tileset: wgpu::Buffer,
    instance_zoom: wgpu::Buffer,
    instance_layer: wgpu::Buffer,

    bind_group_layout: wgpu::BindGroupLayout,
    n_edge_buffer: wgpu::Buffer,
    height_sampler: wgpu::Sampler,
    ortho_sampler: wgpu::Sampler,

    decorator: Option<Arc<AabbDecorator>>,
}

impl TileManager {
    pub fn new(device: &wgpu::Device, quad_limit: usize) -> Self {
        let capacity = (quad_limit.max(1) * 4) as u32;
        let layers_per_array = device.limits().max_texture_array_layers.max(1).min(capacity);

        let index_count = TILE_STRIP_INDICES.len() as u32;
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tile_strip_indices"),
            contents: bytemuck::cast_slice(&TILE_STRIP_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let n_edge_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("n_edge_vertices"),
            contents: bytemuck::cast_slice(&[N_EDGE_VERTICES]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Tile Array Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: std::num::NonZeroU64::new(4),
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Uint,
                            view_dimension: wgpu::TextureViewDimension::D2Array,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2Array,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 4,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let height_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("height_sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let ortho_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ortho_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let arrays = build_arrays(
            device,
            &bind_group_layout,
            &n_edge_buffer,
            &height_sampler,
            &ortho_sampler,
            capacity,
            layers_per_array,
        );

        let (instance_bounds, instance_tileset, instance_zoom, instance_layer) =
            build_instance_buffers(device, capacity);

        TileManager {
            pool: LayerPool::new(capacity),
            arrays,
            layers_per_array,
            quad_limit: quad_limit.max(1),
            index_buffer,
            index_count,
            instance_bounds,
            instance_tileset,
            instance_zoom,
            instance_layer,
            bind_group_layout,
            n_edge_buffer,
            height_sampler,
            ortho_sampler,
            decorator: None,
        }
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn set_aabb_decorator(&mut self, decorator: Arc<AabbDecorator>) {
        self.decorator = Some(decorator);
    }

    pub fn resident_count(&self) -> usize {
        self.pool.len()
    }

    pub fn is_resident(&self, id: TileId) -> bool {
        self.pool.is_resident(id)
    }

    pub fn layer_capacity(&self) -> u32 {
        self.pool.layer_count()
    }

    /// Applies one batched residency update: deletions free their layers
    /// first, then new quads are admitted and their texels written.
    /// Redelivery of a resident tile overwrites its existing layer.
    pub fn update_gpu_quads(
        &mut self,
        queue: &wgpu::Queue,
        new_quads: Vec<GpuTileQuad>,
        deleted_quad_ids: &[TileId],
    ) {
        for quad_id in deleted_quad_ids {
            for child in quad_id.children() {
                self.pool.release(child);
            }
        }

        for quad in new_quads {
            for tile in quad.tiles {
                // a freshly configured decorator wins over the bounds the
                // quad was decoded with
                let bounds = self
                    .decorator
                    .as_ref()
                    .map_or(tile.bounds, |d| d.aabb(tile.id));
                let Some(layer) = self.pool.allocate(tile.id, bounds) else {
                    // resource exhaustion is non-fatal: the draw keeps
                    // using whatever coarser ancestors are resident
                    log::warn!("No free texture layer for tile {}, dropping", tile.id);
                    continue;
                };
                debug_assert_eq!(tile.height.width(), N_EDGE_VERTICES);
                debug_assert_eq!(tile.ortho.width(), ORTHO_RESOLUTION);
                let array = &self.arrays[(layer / self.layers_per_array) as usize];
                let layer_in_array = layer % self.layers_per_array;
                write_layer(
                    queue,
                    &array.height,
                    layer_in_array,
                    bytemuck::cast_slice(tile.height.data()),
                    tile.height.width(),
                    2,
                );
                write_layer(
                    queue,
                    &array.ortho,
                    layer_in_array,
                    tile.ortho.data(),
                    tile.ortho.width(),
                    4,
                );
            }
        }
    }

    /// Records the instanced draws for the given frame selection: the
    /// intersection of the draw set with the resident map, optionally
    /// sorted front to back, partitioned by texture array. Returns the
    /// number of draw calls issued.
    ///
    /// The caller has already set the pipeline and the frame bind group;
    /// this binds group 1 per array partition.
    pub fn draw(
        &mut self,
        queue: &wgpu::Queue,
        render_pass: &mut wgpu::RenderPass,
        camera: &Camera,
        draw_set: &HashSet<TileId>,
        sort_by_distance: bool,
    ) -> usize {
        let eye = camera.position();

        struct Instance {
            array: u32,
            bounds: [f32; 4],
            zoom: i32,
            layer: i32,
            distance: f64,
        }

        let mut instances: Vec<Instance> = Vec::with_capacity(draw_set.len());
        for id in draw_set {
            let Some(tile) = self.pool.get(*id) else {
                continue;
            };
            let b = tile.bounds;
            instances.push(Instance {
                array: tile.layer / self.layers_per_array,
                bounds: [
                    (b.min.x - eye.x) as f32,
                    (b.min.y - eye.y) as f32,
                    (b.max.x - eye.x) as f32,
                    (b.max.y - eye.y) as f32,
                ],
                zoom: id.zoom_level as i32,
                layer: (tile.layer % self.layers_per_array) as i32,
                distance: camera.planar_distance_to(Vector2::new(
                    (b.min.x + b.max.x) / 2.0,
                    (b.min.y + b.max.y) / 2.0,
                )),
            });
        }
        for id in draw_set {
            self.pool.touch(*id);
        }

        if sort_by_distance {
            // front to back, to give early depth rejection a chance
            instances.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        }
        // group per array while preserving draw order inside each group
        instances.sort_by_key(|i| i.array);

        if instances.is_empty() {
            return 0;
        }

        let bounds: Vec<[f32; 4]> = instances.iter().map(|i| i.bounds).collect();
        let tileset: Vec<i32> = instances.iter().map(|i| i.array as i32).collect();
        let zoom: Vec<i32> = instances.iter().map(|i| i.zoom).collect();
        let layer: Vec<i32> = instances.iter().map(|i| i.layer).collect();
        queue.write_buffer(&self.instance_bounds, 0, bytemuck::cast_slice(&bounds));
        queue.write_buffer(&self.instance_tileset, 0, bytemuck::cast_slice(&tileset));
        queue.write_buffer(&self.instance_zoom, 0, bytemuck::cast_slice(&zoom));
        queue.write_buffer(&self.instance_layer, 0, bytemuck::cast_slice(&layer));

        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.set_vertex_buffer(0, self.instance_bounds.slice(..));
        render_pass.set_vertex_buffer(1, self.instance_tileset.slice(..));
        render_pass.set_vertex_buffer(2, self.instance_zoom.slice(..));
        render_pass.set_vertex_buffer(3, self.instance_layer.slice(..));

        let mut draw_calls = 0;
        let mut start = 0usize;
        while start < instances.len() {
            let array = instances[start].array;
            let end = instances[start..]
                .iter()
                .position(|i| i.array != array)
                .map_or(instances.len(), |p| start + p);
            render_pass.set_bind_group(1, &self.arrays[array as usize].bind_group, &[]);
            render_pass.draw_indexed(0..self.index_count, 0, start as u32..end as u32);
            draw_calls += 1;
            start = end;
        }
        draw_calls
    }

    /// Reconfigures the GPU quad budget. Shrinking frees layers (LRU by
    /// last draw use); growing beyond the existing layer space recreates
    /// the arrays, dropping all residents (they re-ship from the RAM
    /// cache). Returns the tile ids whose residency was lost.
    pub fn set_quad_limit(&mut self, device: &wgpu::Device, quad_limit: usize) -> Vec<TileId> {
        let quad_limit = quad_limit.max(1);
        let capacity = (quad_limit * 4) as u32;
        self.quad_limit = quad_limit;
        if capacity <= self.pool.layer_count() {
            return self
                .pool
                .set_budget(capacity)
                .into_iter()
                .map(|t| t.id)
                .collect();
        }

        let dropped: Vec<TileId> = self.pool.residents().map(|t| t.id).collect();
        self.layers_per_array = device.limits().max_texture_array_layers.max(1).min(capacity);
        self.arrays = build_arrays(
            device,
            &self.bind_group_layout,
            &self.n_edge_buffer,
            &self.height_sampler,
            &self.ortho_sampler,
            capacity,
            self.layers_per_array,
        );
        let (bounds, tileset, zoom, layer) = build_instance_buffers(device, capacity);
        self.instance_bounds = bounds;
        self.instance_tileset = tileset;
        self.instance_zoom = zoom;
        self.instance_layer = layer;
        self.pool = LayerPool::new(capacity);
        dropped
    }

    pub fn quad_limit(&self) -> usize {
        self.quad_limit
    }
}

fn build_arrays(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    n_edge_buffer: &wgpu::Buffer,
    height_sampler: &wgpu::Sampler,
    ortho_sampler: &wgpu::Sampler,
    capacity: u32,
    layers_per_array: u32,
) -> Vec<ArraySet> {
    let n_arrays = capacity.div_ceil(layers_per_array);
    let mut arrays = Vec::with_capacity(n_arrays as usize);
    for i in 0..n_arrays {
        let layers = layers_per_array.min(capacity - i * layers_per_array);
        let height = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("height_array"),
            size: wgpu::Extent3d {
                width: N_EDGE_VERTICES,
                height: N_EDGE_VERTICES,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R16Uint,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let ortho = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("ortho_array"),
            size: wgpu::Extent3d {
                width: ORTHO_RESOLUTION,
                height: ORTHO_RESOLUTION,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let height_view = height.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let ortho_view = ortho.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tile Array Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: n_edge_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&height_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(height_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&ortho_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(ortho_sampler),
                },
            ],
        });
        arrays.push(ArraySet {
            ortho,
            height,
            bind_group,
        });
    }
    arrays
}

fn build_instance_buffers(
    device: &wgpu::Device,
    capacity: u32,
) -> (wgpu::Buffer, wgpu::Buffer, wgpu::Buffer, wgpu::Buffer) {
    let instance_buffer = |label: &str, stride: u64| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity as u64 * stride,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    };
    (
        instance_buffer("instance_bounds", 16),
        instance_buffer("instance_tileset_id", 4),
        instance_buffer("instance_zoom_level", 4),
        instance_buffer("instance_texture_layer", 4),
    )
}

fn write_layer(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    layer: u32,
    data: &[u8],
    resolution: u32,
    bytes_per_texel: u32,
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_texel * resolution),
            rows_per_image: Some(resolution),
        },
        wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        },
    );
}
