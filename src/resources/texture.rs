//! Texture loading and management

use std::path::Path;

use glam::Vec3;
use image::{DynamicImage, GenericImageView};

use crate::backend::*;
use crate::context::RenderContext;
use crate::error::{RendererError, RendererResult};
use crate::ibl::CubeFace;

/// Loaded texture data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RendererResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)
            .map_err(|e| RendererError::Texture(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> RendererResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| RendererError::Texture(format!("{}: {}", name, e)))?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    pub fn black() -> Self {
        Self::solid_color([0, 0, 0, 255], "black")
    }

    /// Flat tangent-space normal, (0, 0, 1) encoded as (128, 128, 255)
    pub fn default_normal() -> Self {
        Self::solid_color([128, 128, 255, 255], "default_normal")
    }

    /// Create a checkerboard texture
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8Unorm,
            data,
            name: "checkerboard".to_string(),
        }
    }

    /// Mark the texels as sRGB encoded, for color images sampled without manual decoding
    pub fn into_srgb(mut self) -> Self {
        self.format = match self.format {
            TextureFormat::Rgba8Unorm => TextureFormat::Rgba8UnormSrgb,
            other => other,
        };
        self
    }
}

/// GPU texture with a full view
#[derive(Debug, Clone)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub name: String,
}

impl GpuTexture {
    /// Create and upload a 2D texture
    pub fn create<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        data: &TextureData,
    ) -> RendererResult<Self> {
        let handle = ctx.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            kind: TextureKind::D2,
            mip_levels: 1,
            format: data.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        ctx.write_texture(handle, 0, 0, &data.data, data.width, data.height);
        let view = ctx.create_texture_view(handle, &TextureViewDescriptor::d2())?;

        Ok(Self {
            handle,
            view,
            width: data.width,
            height: data.height,
            format: data.format,
            name: data.name.clone(),
        })
    }

    /// Create and upload a cube map from six square faces in +X, -X, +Y, -Y, +Z, -Z order
    pub fn create_cube<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        name: &str,
        faces: &[TextureData; 6],
    ) -> RendererResult<Self> {
        let size = faces[0].width;
        let format = faces[0].format;
        if let Some(face) = faces
            .iter()
            .find(|face| face.width != size || face.height != size || face.format != format)
        {
            return Err(RendererError::Texture(format!(
                "cube map {}: face {} is {}x{} {:?}, expected {}x{} {:?}",
                name, face.name, face.width, face.height, face.format, size, size, format
            )));
        }

        let handle = ctx.create_texture(&TextureDescriptor {
            label: Some(name.to_string()),
            width: size,
            height: size,
            kind: TextureKind::Cube,
            mip_levels: 1,
            format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        for (layer, face) in faces.iter().enumerate() {
            ctx.write_texture(handle, 0, layer as u32, &face.data, size, size);
        }
        let view = ctx.create_texture_view(handle, &TextureViewDescriptor::cube())?;
        log::info!("Loaded cube map {} ({}x{} {:?})", name, size, size, format);

        Ok(Self {
            handle,
            view,
            width: size,
            height: size,
            format,
            name: name.to_string(),
        })
    }

    pub fn destroy<B: GraphicsBackend>(self, ctx: &mut RenderContext<B>) {
        ctx.destroy_texture(self.handle);
    }
}

/// Load six cube faces from image files in +X, -X, +Y, -Y, +Z, -Z order
pub fn load_cube_faces<P: AsRef<Path>>(paths: &[P; 6]) -> RendererResult<[TextureData; 6]> {
    let mut faces = Vec::with_capacity(6);
    for path in paths {
        faces.push(TextureData::from_file(path)?.into_srgb());
    }
    faces
        .try_into()
        .map_err(|_| RendererError::Texture("expected six cube faces".to_string()))
}

/// Vertical gradient sky with a soft sun glow, as six sRGB cube faces
pub fn gradient_sky_faces(size: u32, sun_direction: Vec3) -> [TextureData; 6] {
    let zenith = Vec3::new(0.18, 0.36, 0.75);
    let horizon = Vec3::new(0.75, 0.82, 0.9);
    let ground = Vec3::new(0.25, 0.22, 0.2);
    let sun = sun_direction.normalize_or_zero();

    CubeFace::ALL.map(|face| {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let u = (x as f32 + 0.5) / size as f32;
                let v = (y as f32 + 0.5) / size as f32;
                let direction = face.direction(u, v);

                let base = if direction.y >= 0.0 {
                    horizon.lerp(zenith, direction.y.powf(0.5))
                } else {
                    horizon.lerp(ground, (-direction.y).powf(0.3))
                };
                let glow = direction.dot(sun).max(0.0).powf(64.0);
                let color = (base + Vec3::splat(glow)).min(Vec3::ONE);

                data.extend_from_slice(&[
                    (color.x * 255.0) as u8,
                    (color.y * 255.0) as u8,
                    (color.z * 255.0) as u8,
                    255,
                ]);
            }
        }
        TextureData {
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: format!("Gradient Sky {:?}", face),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, RecordedCommand};

    #[test]
    fn test_gradient_sky_is_brighter_above() {
        let faces = gradient_sky_faces(8, Vec3::new(0.3, 1.0, 0.2));
        let top = &faces[CubeFace::PositiveY as usize];
        let bottom = &faces[CubeFace::NegativeY as usize];
        assert_eq!(top.data.len(), 8 * 8 * 4);
        let brightness = |face: &TextureData| face.data.iter().map(|b| *b as u32).sum::<u32>();
        assert!(brightness(top) > brightness(bottom));
    }

    #[test]
    fn test_cube_upload_writes_every_layer() {
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let faces = gradient_sky_faces(4, Vec3::Y);
        let cube = GpuTexture::create_cube(&mut ctx, "Sky", &faces).unwrap();

        let layers: Vec<u32> = ctx
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::WriteTexture {
                    texture, array_layer, ..
                } if *texture == cube.handle => Some(*array_layer),
                _ => None,
            })
            .collect();
        assert_eq!(layers, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(ctx.view_info(cube.view).unwrap().dimension, ViewDimension::Cube);
    }

    #[test]
    fn test_mismatched_cube_faces_rejected() {
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let mut faces = gradient_sky_faces(4, Vec3::Y);
        faces[3] = TextureData::white().into_srgb();
        assert!(matches!(
            GpuTexture::create_cube(&mut ctx, "Sky", &faces),
            Err(RendererError::Texture(_))
        ));
    }
}
