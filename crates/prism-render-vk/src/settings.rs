// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
/// SPIR-V compiled by the build script.
pub const DEFAULT_VERTEX_SHADER: &str = concat!(env!("OUT_DIR"), "/triangle.vert.spv");
pub const DEFAULT_FRAGMENT_SHADER: &str = concat!(env!("OUT_DIR"), "/triangle.frag.spv");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VkPolygonMode {
    #[default]
    Fill,
    Wireframe,
}

impl VkPolygonMode {
    pub(crate) fn to_vk(self) -> vk::PolygonMode {
        match self {
            VkPolygonMode::Fill => vk::PolygonMode::FILL,
            VkPolygonMode::Wireframe => vk::PolygonMode::LINE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub app_name: String,
    pub frames_in_flight: usize,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub acquire_timeout: Duration,
    pub validation: bool,
    pub polygon_mode: VkPolygonMode,
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            app_name: "prism".to_owned(),
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            vertex_shader: PathBuf::from(DEFAULT_VERTEX_SHADER),
            fragment_shader: PathBuf::from(DEFAULT_FRAGMENT_SHADER),
            acquire_timeout: Duration::from_secs(2),
            validation: cfg!(debug_assertions),
            polygon_mode: VkPolygonMode::Fill,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RenderSettings {
    pub(crate) fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.max(1)
    }

    pub(crate) fn acquire_timeout_ns(&self) -> u64 {
        u64::try_from(self.acquire_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::load_shader;
    use ash::util::read_spv;
    use std::io::Cursor;
    use std::path::Path;

    #[test]
    fn frames_in_flight_never_zero() {
        let s = RenderSettings {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert_eq!(s.frames_in_flight(), 1);
    }

    #[test]
    fn huge_timeout_saturates() {
        let s = RenderSettings {
            acquire_timeout: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(s.acquire_timeout_ns(), u64::MAX);
    }

    #[test]
    fn wireframe_maps_to_line_mode() {
        assert_eq!(VkPolygonMode::Wireframe.to_vk(), vk::PolygonMode::LINE);
        assert_eq!(VkPolygonMode::default().to_vk(), vk::PolygonMode::FILL);
    }

    #[test]
    fn default_shaders_are_built_spirv() {
        for path in [DEFAULT_VERTEX_SHADER, DEFAULT_FRAGMENT_SHADER] {
            let bytes = load_shader(Path::new(path)).unwrap();
            let words = read_spv(&mut Cursor::new(bytes)).unwrap();
            assert_eq!(words[0], 0x0723_0203, "{path}");
        }
    }
}
