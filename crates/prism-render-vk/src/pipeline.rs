// SPDX-License-Identifier: CEPL-1.0
use crate::error::{PipelineStage, RenderError, Result};
use crate::handles::{Device, Owned};
use ash::util::read_spv;
use ash::vk;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const SHADER_ENTRY: &CStr = c"main";

/// Read a SPIR-V blob from disk.
pub fn load_shader(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| RenderError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("loaded shader {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

/// Field order is destruction order: pipeline, layout, render pass.
pub struct PipelineState {
    pub pipeline: Owned<vk::Pipeline>,
    pub layout: Owned<vk::PipelineLayout>,
    pub render_pass: Owned<vk::RenderPass>,
    pub color_format: vk::Format,
}

/// Single color attachment, cleared on load and handed to presentation.
pub fn color_attachment(color_format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

pub const COLOR_ATTACHMENT_REF: vk::AttachmentReference = vk::AttachmentReference {
    attachment: 0,
    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
};

/// The layout transition must not start before the acquired image is
/// released by the presentation engine, which the submit only guarantees at
/// COLOR_ATTACHMENT_OUTPUT.
pub fn render_pass_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
}

/// # Safety
/// `device` must be a live logical device.
pub unsafe fn create_render_pass(
    device: &Arc<Device>,
    color_format: vk::Format,
) -> Result<Owned<vk::RenderPass>> {
    let color_refs = [COLOR_ATTACHMENT_REF];
    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);

    let attachments = [color_attachment(color_format)];
    let subpasses = [subpass];
    let dependencies = [render_pass_dependency()];
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let raw = device
        .create_render_pass(&info, None)
        .map_err(RenderError::pipeline(PipelineStage::RenderPass))?;
    Ok(Owned::new(device, raw))
}

/// Viewport and scissor are set while recording, so a resize never needs a
/// new pipeline.
pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Geometry comes from the vertex shader alone.
pub fn vertex_input_state() -> vk::PipelineVertexInputStateCreateInfo<'static> {
    vk::PipelineVertexInputStateCreateInfo::default()
}

pub fn input_assembly_state() -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
    vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false)
}

/// Counts only; the rectangles are dynamic.
pub fn viewport_state() -> vk::PipelineViewportStateCreateInfo<'static> {
    vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1)
}

pub fn rasterization_state(
    polygon_mode: vk::PolygonMode,
) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(polygon_mode)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
}

pub fn multisample_state() -> vk::PipelineMultisampleStateCreateInfo<'static> {
    vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
}

pub fn blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
}

unsafe fn create_shader_module(
    device: &Arc<Device>,
    bytes: &[u8],
) -> Result<Owned<vk::ShaderModule>> {
    // read_spv copies into u32 words, which also fixes alignment.
    let words = read_spv(&mut Cursor::new(bytes)).map_err(RenderError::InvalidShader)?;
    let info = vk::ShaderModuleCreateInfo::default().code(&words);
    let raw = device
        .create_shader_module(&info, None)
        .map_err(RenderError::pipeline(PipelineStage::ShaderModule))?;
    Ok(Owned::new(device, raw))
}

/// Render pass, empty layout and the fixed triangle pipeline. No vertex
/// buffers; three vertices per draw.
///
/// # Safety
/// `device` must be a live logical device. `polygon_mode` other than FILL
/// requires `fillModeNonSolid` to be enabled.
pub unsafe fn build_pipeline(
    device: &Arc<Device>,
    color_format: vk::Format,
    vertex_spv: &[u8],
    fragment_spv: &[u8],
    polygon_mode: vk::PolygonMode,
) -> Result<PipelineState> {
    // Both modules are released when this function returns, on every path.
    let vertex = create_shader_module(device, vertex_spv)?;
    let fragment = create_shader_module(device, fragment_spv)?;

    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex.raw())
            .name(SHADER_ENTRY),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment.raw())
            .name(SHADER_ENTRY),
    ];

    let vertex_input = vertex_input_state();
    let input_assembly = input_assembly_state();
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);
    let viewport = viewport_state();
    let raster = rasterization_state(polygon_mode);
    let multisample = multisample_state();

    let blend_attachments = [blend_attachment()];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    // No descriptor sets, no push constants.
    let layout_info = vk::PipelineLayoutCreateInfo::default();
    let layout = device
        .create_pipeline_layout(&layout_info, None)
        .map_err(RenderError::pipeline(PipelineStage::Layout))?;
    let layout = Owned::new(device, layout);

    let render_pass = create_render_pass(device, color_format)?;

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&raster)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(layout.raw())
        .render_pass(render_pass.raw())
        .subpass(0);

    let pipeline = device
        .create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        )
        .map_err(|(_, err)| RenderError::pipeline(PipelineStage::Pipeline)(err))?
        .into_iter()
        .next()
        .ok_or(RenderError::pipeline(PipelineStage::Pipeline)(
            vk::Result::ERROR_UNKNOWN,
        ))?;

    info!(
        "graphics pipeline ready (format {:?}, {:?})",
        color_format, polygon_mode
    );

    Ok(PipelineState {
        pipeline: Owned::new(device, pipeline),
        layout,
        render_pass,
        color_format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_shader_reports_path() {
        let path = Path::new("definitely/not/here/triangle.vert.spv");
        match load_shader(path) {
            Err(RenderError::ShaderLoad { path: p, source }) => {
                assert_eq!(p, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected ShaderLoad, got {other:?}"),
        }
    }

    #[test]
    fn existing_shader_is_read_verbatim() {
        let path = std::env::temp_dir().join(format!("prism-shader-{}.spv", std::process::id()));
        let blob = 0x0723_0203_u32.to_le_bytes();
        std::fs::write(&path, blob).unwrap();

        let bytes = load_shader(&path).unwrap();
        assert_eq!(bytes, blob);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn attachment_goes_from_undefined_to_present() {
        let a = color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(a.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(a.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(a.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(a.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(a.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(a.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(COLOR_ATTACHMENT_REF.attachment, 0);
        assert_eq!(COLOR_ATTACHMENT_REF.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn external_dependency_guards_color_writes() {
        let d = render_pass_dependency();
        assert_eq!(d.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(d.dst_subpass, 0);
        assert_eq!(d.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(d.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(d.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(d.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn no_vertex_input_and_plain_triangle_list() {
        let vi = vertex_input_state();
        assert_eq!(vi.vertex_binding_description_count, 0);
        assert_eq!(vi.vertex_attribute_description_count, 0);

        let ia = input_assembly_state();
        assert_eq!(ia.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(ia.primitive_restart_enable, vk::FALSE);
    }

    #[test]
    fn viewport_and_scissor_are_dynamic() {
        assert_eq!(DYNAMIC_STATES, [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]);
        let vp = viewport_state();
        assert_eq!((vp.viewport_count, vp.scissor_count), (1, 1));
        assert!(vp.p_viewports.is_null());
        assert!(vp.p_scissors.is_null());
    }

    #[test]
    fn rasterizer_culls_back_faces_clockwise() {
        for mode in [vk::PolygonMode::FILL, vk::PolygonMode::LINE] {
            let r = rasterization_state(mode);
            assert_eq!(r.polygon_mode, mode);
            assert_eq!(r.cull_mode, vk::CullModeFlags::BACK);
            assert_eq!(r.front_face, vk::FrontFace::CLOCKWISE);
            assert_eq!(r.line_width, 1.0);
            assert_eq!(r.depth_bias_enable, vk::FALSE);
            assert_eq!(r.depth_clamp_enable, vk::FALSE);
            assert_eq!(r.rasterizer_discard_enable, vk::FALSE);
        }
        let ms = multisample_state();
        assert_eq!(ms.rasterization_samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn blending_off_writes_all_channels() {
        let b = blend_attachment();
        assert_eq!(b.blend_enable, vk::FALSE);
        assert_eq!(b.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
