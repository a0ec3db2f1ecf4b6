//! GPU textures and per-model texture deduplication.
//!
//! This module provides [`Texture`], a device texture plus the descriptor
//! indices that expose it, and [`TextureRegistry`], which makes sure a model
//! uploads every distinct source image once.

use std::{collections::HashMap, rc::Rc};

use crate::{
    context::Context,
    gpu::{
        Backend, ResourceId, TextureDesc, TextureUsage,
        command::CommandList,
        descriptor::{DepthTargetViewDesc, ShaderResourceViewDesc},
    },
    resources::cpu::ImageCpuData,
};

/// A device texture with the views created for it.
///
/// Colour textures carry a shader-resource view; the depth texture carries a
/// depth-target view instead.
pub struct Texture {
    backend: Rc<dyn Backend>,
    resource: ResourceId,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub srv: Option<u32>,
    pub dsv: Option<u32>,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    /// Format colour textures are uploaded in.
    pub const COLOUR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Creates a sampled texture, records the upload of `rgba` on `list` and
    /// writes a shader-resource view of it.
    ///
    /// `rgba` holds tightly packed 8-bit RGBA rows.
    pub fn from_rgba(
        ctx: &mut Context,
        list: &mut CommandList,
        name: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            rgba.len() == (width as usize) * (height as usize) * 4,
            "texture {name}: {} bytes do not match {width}x{height} RGBA",
            rgba.len()
        );
        let resource = ctx.backend().create_texture(&TextureDesc {
            label: name.to_string(),
            width,
            height,
            format: Self::COLOUR_FORMAT,
            usage: TextureUsage::Sampled,
        })?;
        list.upload_texture(resource, width, height, rgba);
        let srv = ctx.create_srv(
            resource,
            ShaderResourceViewDesc::Texture2D {
                format: Self::COLOUR_FORMAT,
                mip_levels: 1,
            },
        )?;
        Ok(Self {
            backend: ctx.backend().clone(),
            resource,
            name: name.to_string(),
            width,
            height,
            srv: Some(srv),
            dsv: None,
        })
    }

    /// Create a depth texture for depth-testing during rendering, with its
    /// depth-target view.
    pub fn create_depth_texture(
        ctx: &mut Context,
        size: [u32; 2],
        label: &str,
    ) -> anyhow::Result<Self> {
        let (width, height) = (size[0].max(1), size[1].max(1));
        let resource = ctx.backend().create_texture(&TextureDesc {
            label: label.to_string(),
            width,
            height,
            format: Self::DEPTH_FORMAT,
            usage: TextureUsage::DepthTarget,
        })?;
        let dsv = ctx.create_dsv(
            resource,
            DepthTargetViewDesc {
                format: Self::DEPTH_FORMAT,
            },
        )?;
        Ok(Self {
            backend: ctx.backend().clone(),
            resource,
            name: label.to_string(),
            width,
            height,
            srv: None,
            dsv: Some(dsv),
        })
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.backend.destroy_resource(self.resource);
    }
}

/// The textures of one model, keyed by source path or embedded name.
#[derive(Default)]
pub struct TextureRegistry {
    textures: Vec<Texture>,
    by_key: HashMap<String, usize>,
}

impl TextureRegistry {
    /// Returns the shader-resource index for `key`, uploading `image` the first
    /// time the key is seen.
    pub fn get_or_upload(
        &mut self,
        ctx: &mut Context,
        list: &mut CommandList,
        key: &str,
        image: &ImageCpuData,
    ) -> anyhow::Result<u32> {
        if let Some(&i) = self.by_key.get(key) {
            return self.textures[i]
                .srv
                .ok_or_else(|| anyhow::anyhow!("texture {key} has no shader view"));
        }
        let texture = Texture::from_rgba(ctx, list, key, image.width, image.height, &image.rgba)?;
        let srv = texture.srv;
        self.by_key.insert(key.to_string(), self.textures.len());
        self.textures.push(texture);
        srv.ok_or_else(|| anyhow::anyhow!("texture {key} has no shader view"))
    }

    pub fn get(&self, key: &str) -> Option<&Texture> {
        self.by_key.get(key).map(|&i| &self.textures[i])
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Texture> {
        self.textures.iter()
    }
}
