//! Compute pipelines and per-model GPU buffers for animation evaluation.

use glam::{Mat4, Vec4};

use super::shaders;
use super::{AnimParams, PerInstanceAnimData, WORKGROUP_INSTANCES};
use crate::gpu::{
    create_compute_pipeline, storage_buffer, storage_buffer_read_only,
    uniform_buffer, GpuContext, TypedBuffer, UniformBuffer,
};
use crate::model::Model;

/// The three animation compute pipelines, shared by all models.
pub struct AnimationPipeline {
    transform: wgpu::ComputePipeline,
    transform_headmove: wgpu::ComputePipeline,
    matrix_mult: wgpu::ComputePipeline,
    bounding_spheres: wgpu::ComputePipeline,
    transform_layout: wgpu::BindGroupLayout,
    matrix_layout: wgpu::BindGroupLayout,
    spheres_layout: wgpu::BindGroupLayout,
}

impl AnimationPipeline {
    /// Build the pipelines and bind group layouts.
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let compute = wgpu::ShaderStages::COMPUTE;

        let transform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Anim Transform Bind Group Layout"),
                entries: &[
                    storage_buffer_read_only(0, compute),
                    storage_buffer_read_only(1, compute),
                    storage_buffer(2, compute),
                    uniform_buffer(3, compute),
                ],
            });
        let matrix_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Anim Matrix Bind Group Layout"),
                entries: &[
                    storage_buffer_read_only(0, compute),
                    storage_buffer_read_only(1, compute),
                    storage_buffer_read_only(2, compute),
                    storage_buffer(3, compute),
                    uniform_buffer(4, compute),
                ],
            });
        let spheres_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Anim Spheres Bind Group Layout"),
                entries: &[
                    storage_buffer_read_only(0, compute),
                    storage_buffer_read_only(1, compute),
                    storage_buffer_read_only(2, compute),
                    storage_buffer_read_only(3, compute),
                    storage_buffer(4, compute),
                    uniform_buffer(5, compute),
                ],
            });

        Self {
            transform: create_compute_pipeline(
                device,
                "Anim Transform",
                &shaders::transform_source(),
                "main",
                &[&transform_layout],
            ),
            transform_headmove: create_compute_pipeline(
                device,
                "Anim Transform HeadMove",
                &shaders::transform_headmove_source(),
                "main",
                &[&transform_layout],
            ),
            matrix_mult: create_compute_pipeline(
                device,
                "Anim Matrix Mult",
                shaders::MATRIX_MULT,
                "main",
                &[&matrix_layout],
            ),
            bounding_spheres: create_compute_pipeline(
                device,
                "Anim Bounding Spheres",
                shaders::BOUNDING_SPHERES,
                "main",
                &[&spheres_layout],
            ),
            transform_layout,
            matrix_layout,
            spheres_layout,
        }
    }

    /// Record the transform sampling stage in its own compute pass.
    pub fn dispatch_transform(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &ModelAnimBuffers,
        head_move: bool,
    ) {
        let Some(bind_group) = buffers.transform_bind.as_ref() else {
            return;
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Anim Transform Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(if head_move {
            &self.transform_headmove
        } else {
            &self.transform
        });
        pass.set_bind_group(0, bind_group, &[]);
        let (x, y) = buffers.dispatch_size();
        pass.dispatch_workgroups(x, y, 1);
    }

    /// Record the matrix composition stage. With `skeleton_pose` the bone
    /// offsets are identity and the result lands in the skeleton-matrix
    /// buffer, which is what the bounding-sphere stage reads.
    pub fn dispatch_matrix(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &ModelAnimBuffers,
        skeleton_pose: bool,
    ) {
        let bind_group = if skeleton_pose {
            buffers.matrix_skeleton_bind.as_ref()
        } else {
            buffers.matrix_bind.as_ref()
        };
        let Some(bind_group) = bind_group else { return };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Anim Matrix Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.matrix_mult);
        pass.set_bind_group(0, bind_group, &[]);
        let (x, y) = buffers.dispatch_size();
        pass.dispatch_workgroups(x, y, 1);
    }

    /// Record the bounding-sphere stage.
    pub fn dispatch_spheres(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &ModelAnimBuffers,
    ) {
        let Some(bind_group) = buffers.spheres_bind.as_ref() else {
            return;
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Anim Spheres Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.bounding_spheres);
        pass.set_bind_group(0, bind_group, &[]);
        let (x, y) = buffers.dispatch_size();
        pass.dispatch_workgroups(x, y, 1);
    }
}

/// GPU buffers of one animated model: the immutable lookup data uploaded at
/// model load, and the per-frame transient buffers sized to the current
/// instance count.
pub struct ModelAnimBuffers {
    bone_count: usize,
    instance_count: usize,

    // Immutable model data.
    anim_lookup: TypedBuffer<Vec4>,
    bone_parents: TypedBuffer<i32>,
    bone_offsets: TypedBuffer<Mat4>,
    identity_offsets: TypedBuffer<Mat4>,
    sphere_adjustments: TypedBuffer<Vec4>,

    // Per-frame transient data.
    per_instance: TypedBuffer<PerInstanceAnimData>,
    world_matrices: TypedBuffer<Mat4>,
    trs: TypedBuffer<Vec4>,
    bone_matrices: TypedBuffer<Mat4>,
    skeleton_matrices: TypedBuffer<Mat4>,
    spheres: TypedBuffer<Vec4>,
    params: UniformBuffer<AnimParams>,

    transform_bind: Option<wgpu::BindGroup>,
    matrix_bind: Option<wgpu::BindGroup>,
    matrix_skeleton_bind: Option<wgpu::BindGroup>,
    spheres_bind: Option<wgpu::BindGroup>,
}

impl ModelAnimBuffers {
    /// Upload a model's immutable animation data. Returns `None` for
    /// models without animations.
    #[must_use]
    pub fn new(device: &wgpu::Device, model: &Model) -> Option<Self> {
        let lookup = model.anim_lookup.as_ref()?;
        let skeleton = model.skeleton.as_ref()?;
        let storage = wgpu::BufferUsages::STORAGE;
        let storage_src = storage | wgpu::BufferUsages::COPY_SRC;

        let bone_count = skeleton.bone_count();
        let label = |part: &str| format!("{} {part}", model.name);

        Some(Self {
            bone_count,
            instance_count: 0,
            anim_lookup: TypedBuffer::new_with_data(
                device,
                &label("Anim Lookup"),
                &lookup.data,
                storage,
            ),
            bone_parents: TypedBuffer::new_with_data(
                device,
                &label("Bone Parents"),
                &skeleton.parent_indices(),
                storage,
            ),
            bone_offsets: TypedBuffer::new_with_data(
                device,
                &label("Bone Offsets"),
                &skeleton.offset_matrices,
                storage,
            ),
            identity_offsets: TypedBuffer::new_with_data(
                device,
                &label("Identity Offsets"),
                &vec![Mat4::IDENTITY; bone_count],
                storage,
            ),
            sphere_adjustments: TypedBuffer::new_with_data(
                device,
                &label("Sphere Adjustments"),
                &model.settings.bounding_sphere_adjustments,
                storage,
            ),
            per_instance: TypedBuffer::new(device, &label("Per-Instance Anim"), storage),
            world_matrices: TypedBuffer::new(device, &label("World Matrices"), storage),
            trs: TypedBuffer::new(device, &label("TRS"), storage_src),
            bone_matrices: TypedBuffer::new(device, &label("Bone Matrices"), storage_src),
            skeleton_matrices: TypedBuffer::new(
                device,
                &label("Skeleton Matrices"),
                storage_src,
            ),
            spheres: TypedBuffer::new(device, &label("Bounding Spheres"), storage_src),
            params: UniformBuffer::new(
                device,
                &label("Anim Params"),
                &AnimParams::default(),
            ),
            transform_bind: None,
            matrix_bind: None,
            matrix_skeleton_bind: None,
            spheres_bind: None,
        })
    }

    /// Bones per instance.
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    /// Instances covered by the last upload.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    fn dispatch_size(&self) -> (u32, u32) {
        (
            self.bone_count as u32,
            (self.instance_count as u32).div_ceil(WORKGROUP_INSTANCES),
        )
    }

    /// Upload this frame's per-instance data and world matrices, growing
    /// the transient buffers as needed. Any reallocation rebuilds the
    /// compute bind groups before the first consuming dispatch; the
    /// returned flag tells render-side consumers of these buffers to do
    /// the same.
    pub fn upload_frame(
        &mut self,
        context: &GpuContext,
        pipeline: &AnimationPipeline,
        anim_data: &[PerInstanceAnimData],
        world_matrices: &[Mat4],
    ) -> bool {
        let device = &context.device;
        let queue = &context.queue;
        self.instance_count = anim_data.len();
        let per_bone = self.bone_count * self.instance_count;

        let mut resized = self.per_instance.write(device, queue, anim_data);
        resized |= self.world_matrices.write(device, queue, world_matrices);
        resized |= self.trs.check_for_resize(device, per_bone * 3);
        resized |= self.bone_matrices.check_for_resize(device, per_bone);
        resized |= self.skeleton_matrices.check_for_resize(device, per_bone);
        resized |= self.spheres.check_for_resize(device, per_bone);

        self.params.write(
            queue,
            &AnimParams {
                bone_count: self.bone_count as u32,
                instance_count: self.instance_count as u32,
                _pad: [0; 2],
            },
        );

        let rebuilt = resized || self.transform_bind.is_none();
        if rebuilt {
            self.rebuild_bind_groups(device, pipeline);
        }
        rebuilt
    }

    fn rebuild_bind_groups(&mut self, device: &wgpu::Device, pipeline: &AnimationPipeline) {
        fn entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
            wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            }
        }

        self.transform_bind = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Anim Transform Bind Group"),
            layout: &pipeline.transform_layout,
            entries: &[
                entry(0, self.anim_lookup.buffer()),
                entry(1, self.per_instance.buffer()),
                entry(2, self.trs.buffer()),
                entry(3, self.params.buffer()),
            ],
        }));
        self.matrix_bind = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Anim Matrix Bind Group"),
            layout: &pipeline.matrix_layout,
            entries: &[
                entry(0, self.trs.buffer()),
                entry(1, self.bone_parents.buffer()),
                entry(2, self.bone_offsets.buffer()),
                entry(3, self.bone_matrices.buffer()),
                entry(4, self.params.buffer()),
            ],
        }));
        self.matrix_skeleton_bind =
            Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Anim Skeleton Matrix Bind Group"),
                layout: &pipeline.matrix_layout,
                entries: &[
                    entry(0, self.trs.buffer()),
                    entry(1, self.bone_parents.buffer()),
                    entry(2, self.identity_offsets.buffer()),
                    entry(3, self.skeleton_matrices.buffer()),
                    entry(4, self.params.buffer()),
                ],
            }));
        self.spheres_bind = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Anim Spheres Bind Group"),
            layout: &pipeline.spheres_layout,
            entries: &[
                entry(0, self.skeleton_matrices.buffer()),
                entry(1, self.bone_parents.buffer()),
                entry(2, self.world_matrices.buffer()),
                entry(3, self.sphere_adjustments.buffer()),
                entry(4, self.spheres.buffer()),
                entry(5, self.params.buffer()),
            ],
        }));
    }

    /// Re-upload sphere adjustments after the host edited them.
    pub fn update_sphere_adjustments(
        &mut self,
        context: &GpuContext,
        adjustments: &[Vec4],
    ) {
        if self
            .sphere_adjustments
            .write(&context.device, &context.queue, adjustments)
        {
            // Reallocation invalidates every bind group referencing the
            // buffer; rebuild lazily on the next upload.
            self.transform_bind = None;
        }
    }

    /// Read the composed bone matrices back (host-side IK input). Blocks
    /// until the compute submission has finished.
    #[must_use]
    pub fn download_bone_matrices(&self, context: &GpuContext) -> Vec<Mat4> {
        self.bone_matrices
            .download_at(context, 0, self.bone_count * self.instance_count)
    }

    /// Read the sampled TRS rows back for the IK write-back.
    #[must_use]
    pub fn download_trs(&self, context: &GpuContext) -> Vec<Vec4> {
        self.trs
            .download_at(context, 0, self.bone_count * self.instance_count * 3)
    }

    /// Upload corrected TRS rows; stage 2 must be re-dispatched afterwards.
    pub fn upload_trs(&mut self, context: &GpuContext, trs: &[Vec4]) {
        if self.trs.write(&context.device, &context.queue, trs) {
            self.transform_bind = None;
        }
    }

    /// Read the per-bone bounding spheres back.
    #[must_use]
    pub fn download_spheres(&self, context: &GpuContext) -> Vec<Vec4> {
        self.spheres
            .download_at(context, 0, self.bone_count * self.instance_count)
    }

    /// The bone-matrix buffer, bound by the skinning vertex shader.
    #[must_use]
    pub fn bone_matrix_buffer(&self) -> &wgpu::Buffer {
        self.bone_matrices.buffer()
    }

    /// The world-matrix buffer, bound by the skinning vertex shader.
    #[must_use]
    pub fn world_matrix_buffer(&self) -> &wgpu::Buffer {
        self.world_matrices.buffer()
    }
}
