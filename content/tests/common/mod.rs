//! Content types shared by the integration tests.

#![allow(dead_code)]

use redlilium_content::{ObjectRef, Ref, Serializable, TypeRegistry};
use serde::{Deserialize, Serialize};

pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

#[derive(Debug, Default, Serializable)]
#[serialize(tag = "demo.Texture", id = 1)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub label: Option<String>,
}

#[derive(Debug, Default, Serializable)]
#[serialize(tag = "demo.Material", id = 2, alias = "demo.OldMaterial")]
pub struct Material {
    pub roughness: f32,
    #[serialize(value)]
    pub tint: Color,
    pub albedo: Option<Ref<Texture>>,
    pub normal: Option<Ref<Texture>>,
}

#[derive(Debug, Default, Serializable)]
#[serialize(tag = "demo.Transform")]
pub struct Transform {
    #[serialize(value)]
    pub position: [f32; 3],
    pub scale: f32,
}

#[derive(Debug, Default, Serializable)]
#[serialize(tag = "demo.Mesh", id = 3)]
pub struct Mesh {
    pub name: String,
    pub transform: Transform,
    pub material: Option<Ref<Material>>,
    #[serialize(rename = "vertices", read_only)]
    pub vertex_count: u32,
    #[serialize(skip)]
    pub gpu_handle: Option<u64>,
}

#[derive(Debug, Default, Serializable)]
#[serialize(tag = "demo.PointLight", id = 10)]
pub struct PointLight {
    pub range: f32,
    pub target: Option<ObjectRef>,
}

/// A mesh with its material, referenced where a plain mesh is expected.
#[derive(Debug, Default, Serializable)]
#[serialize(tag = "demo.Model")]
pub struct Model {
    #[serialize(part)]
    pub mesh: Option<Ref<Mesh>>,
    #[serialize(part)]
    pub material: Option<Ref<Material>>,
}

/// Page of packed textures with a preview that is only ever written.
#[derive(Debug, Default, Serializable)]
#[serialize(tag = "demo.Atlas")]
pub struct Atlas {
    pub gamma: f64,
    #[serialize(read_only)]
    pub preview: Option<Ref<Texture>>,
    pub page: Option<Ref<Texture>>,
}

#[derive(Debug, Default, Serializable)]
#[serialize(tag = "demo.Scene", always_tag)]
pub struct Scene {
    pub name: String,
    pub focus: Option<ObjectRef>,
    pub lights: Vec<Box<dyn Serializable>>,
    pub meshes: Vec<Option<Ref<Mesh>>>,
    pub sky: Option<Ref<Texture>>,
}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Texture>()
        .unwrap()
        .register::<Material>()
        .unwrap()
        .register::<Transform>()
        .unwrap()
        .register::<Mesh>()
        .unwrap()
        .register::<PointLight>()
        .unwrap()
        .register::<Model>()
        .unwrap()
        .register::<Atlas>()
        .unwrap()
        .register::<Scene>()
        .unwrap();
    registry.validate().unwrap();
    registry
}

pub fn texture(width: u32, height: u32) -> Ref<Texture> {
    Ref::new(Texture {
        width,
        height,
        label: None,
    })
}

pub fn material(roughness: f32, albedo: &Ref<Texture>) -> Ref<Material> {
    Ref::new(Material {
        roughness,
        tint: Color {
            r: 1.0,
            g: 0.5,
            b: 0.25,
        },
        albedo: Some(albedo.clone()),
        normal: None,
    })
}

pub fn mesh(name: &str, material: &Ref<Material>) -> Ref<Mesh> {
    Ref::new(Mesh {
        name: name.to_owned(),
        transform: Transform {
            position: [1.0, 2.0, 3.0],
            scale: 2.0,
        },
        material: Some(material.clone()),
        vertex_count: 36,
        gpu_handle: Some(7),
    })
}
