//! Shading parameters and texture references of a surface.

/// Texture slots a material can reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    BaseColour,
    MetallicRoughness,
    Emissive,
    Normal,
    Occlusion,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 5] = [
        TextureSlot::BaseColour,
        TextureSlot::MetallicRoughness,
        TextureSlot::Emissive,
        TextureSlot::Normal,
        TextureSlot::Occlusion,
    ];

    /// Bit set in [`Material::flags`] when this slot has a texture.
    pub fn flag(self) -> u32 {
        1 << self as u32
    }
}

pub const FLAG_UNLIT: u32 = 1 << 5;
pub const FLAG_RECEIVE_SHADOWS: u32 = 1 << 6;

/// Shader-resource indices of a material's textures, one per [`TextureSlot`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    pub base_colour: Option<u32>,
    pub metallic_roughness: Option<u32>,
    pub emissive: Option<u32>,
    pub normal: Option<u32>,
    pub occlusion: Option<u32>,
}

impl MaterialTextures {
    pub fn get(&self, slot: TextureSlot) -> Option<u32> {
        match slot {
            TextureSlot::BaseColour => self.base_colour,
            TextureSlot::MetallicRoughness => self.metallic_roughness,
            TextureSlot::Emissive => self.emissive,
            TextureSlot::Normal => self.normal,
            TextureSlot::Occlusion => self.occlusion,
        }
    }

    pub fn set(&mut self, slot: TextureSlot, index: Option<u32>) {
        let target = match slot {
            TextureSlot::BaseColour => &mut self.base_colour,
            TextureSlot::MetallicRoughness => &mut self.metallic_roughness,
            TextureSlot::Emissive => &mut self.emissive,
            TextureSlot::Normal => &mut self.normal,
            TextureSlot::Occlusion => &mut self.occlusion,
        };
        *target = index;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_colour: [f32; 4],
    pub emissive: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub unlit: bool,
    pub receive_shadows: bool,
    pub textures: MaterialTextures,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            base_colour: [1.0; 4],
            emissive: [0.0; 3],
            metallic: 0.0,
            roughness: 1.0,
            normal_scale: 0.0,
            occlusion_strength: 0.0,
            unlit: false,
            receive_shadows: true,
            textures: MaterialTextures::default(),
        }
    }
}

impl Material {
    pub fn flags(&self) -> u32 {
        let mut flags = TextureSlot::ALL
            .into_iter()
            .filter(|slot| self.textures.get(*slot).is_some())
            .fold(0, |acc, slot| acc | slot.flag());
        if self.unlit {
            flags |= FLAG_UNLIT;
        }
        if self.receive_shadows {
            flags |= FLAG_RECEIVE_SHADOWS;
        }
        flags
    }

    /// Descriptor index for `slot`, or 0 when the slot is empty. Shaders
    /// check [`flags`](Self::flags) before sampling.
    pub fn texture_index(&self, slot: TextureSlot) -> u32 {
        self.textures.get(slot).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_track_present_textures() {
        let mut material = Material::default();
        assert_eq!(material.flags(), FLAG_RECEIVE_SHADOWS);
        material.textures.set(TextureSlot::Normal, Some(9));
        assert_eq!(material.flags() & TextureSlot::Normal.flag(), TextureSlot::Normal.flag());
        assert_eq!(material.texture_index(TextureSlot::Normal), 9);
        assert_eq!(material.texture_index(TextureSlot::Emissive), 0);
    }
}
