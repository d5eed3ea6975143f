mod common;

use common::*;
use redlilium_content::{
    ContentConfig, DiagnosticKind, Document, Identity, ReadOutput, Reader, Ref, UnresolvedPolicy,
};

const SCENE: &str = "00000000-0000-4000-8000-000000000001";
const MESH_A: &str = "00000000-0000-4000-8000-00000000000a";
const MESH_B: &str = "00000000-0000-4000-8000-00000000000b";
const MATERIAL: &str = "00000000-0000-4000-8000-0000000000c0";
const TEXTURE: &str = "00000000-0000-4000-8000-0000000000d0";
const MISSING: &str = "00000000-0000-4000-8000-0000000000ff";

fn id(text: &str) -> Identity {
    Identity::parse(text).unwrap()
}

fn read_scene(json: &str, config: ContentConfig) -> ReadOutput<Ref<Scene>> {
    init_logging();
    let registry = registry();
    let document = Document::from_json(json).unwrap();
    pollster::block_on(
        Reader::new(&registry)
            .with_config(config)
            .read_as::<Scene>(&document),
    )
    .unwrap()
}

#[test]
fn forward_references_bind_after_construction() {
    let json = format!(
        r#"{{
            "$type": "demo.Scene",
            "$id": "{SCENE}",
            "name": "forward",
            "focus": {{"ReferenceGuid": "{MESH_B}"}},
            "lights": [
                {{"$type": "demo.PointLight", "range": 4.0, "target": {{"ReferenceGuid": "{MESH_A}"}}}}
            ],
            "meshes": [
                {{"$type": "demo.Mesh", "$id": "{MESH_A}", "name": "a",
                  "material": {{"ReferenceGuid": "{MATERIAL}"}}}},
                {{"$type": "demo.Mesh", "$id": "{MESH_B}", "name": "b",
                  "material": {{"$type": "demo.Material", "$id": "{MATERIAL}", "roughness": 0.5}}}},
                {{"ReferenceGuid": "{MESH_A}"}}
            ],
            "sky": null
        }}"#
    );
    let output = read_scene(&json, ContentConfig::default());
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    let scene = output.root.read();
    assert_eq!(output.root.identity(), id(SCENE));
    let a = scene.meshes[0].clone().unwrap();
    let b = scene.meshes[1].clone().unwrap();
    assert_eq!(a.identity(), id(MESH_A));
    assert_eq!(b.identity(), id(MESH_B));
    assert_eq!(scene.meshes[2].as_ref(), Some(&a));

    assert!(scene.focus.as_ref().unwrap().ptr_eq(b.object()));
    // The light is owned by the scene; its deferred target is bound through
    // the `lights[0]` path.
    let light = scene.lights[0].downcast_ref::<PointLight>().unwrap();
    assert_eq!(light.range, 4.0);
    assert!(light.target.as_ref().unwrap().ptr_eq(a.object()));

    let material_a = a.read().material.clone().unwrap();
    let material_b = b.read().material.clone().unwrap();
    assert_eq!(material_a, material_b);
    assert_eq!(material_a.identity(), id(MATERIAL));
    assert_eq!(material_a.read().roughness, 0.5);
}

#[test]
fn backward_reference_to_root() {
    init_logging();
    let registry = registry();
    let json = format!(
        r#"{{"$type": "demo.PointLight", "$id": "{SCENE}", "range": 1.0,
            "target": {{"ReferenceGuid": "{SCENE}"}}}}"#
    );
    let document = Document::from_json(&json).unwrap();
    let output = Reader::new(&registry).read_blocking(&document).unwrap();
    assert!(output.diagnostics.is_empty());

    let root = output.root;
    let target = root
        .read()
        .downcast_ref::<PointLight>()
        .unwrap()
        .target
        .clone()
        .unwrap();
    assert!(target.ptr_eq(&root));
    // Break the cycle so the test does not leak.
    root.write().downcast_mut::<PointLight>().unwrap().target = None;
}

#[test]
fn unresolved_reference_keeps_default() {
    let json = format!(
        r#"{{"$type": "demo.Scene", "name": "s", "sky": {{"ReferenceGuid": "{MISSING}"}}}}"#
    );
    let output = read_scene(&json, ContentConfig::default());
    assert!(output.root.read().sky.is_none());
    assert_eq!(output.diagnostics.len(), 1);
    let diagnostic = &output.diagnostics[0];
    assert_eq!(diagnostic.path, "root.sky");
    assert!(matches!(
        diagnostic.kind,
        DiagnosticKind::UnresolvedReference(missing) if missing == id(MISSING)
    ));
}

#[test]
fn unresolved_reference_can_be_ignored() {
    let json = format!(
        r#"{{"$type": "demo.Scene", "sky": {{"ReferenceGuid": "{MISSING}"}}}}"#
    );
    let config = ContentConfig {
        unresolved_references: UnresolvedPolicy::Ignore,
        ..Default::default()
    };
    let output = read_scene(&json, config);
    assert!(output.diagnostics.is_empty());
    assert!(output.root.read().sky.is_none());
}

#[test]
fn unresolved_sequence_element_becomes_none() {
    let json = format!(
        r#"{{"$type": "demo.Scene", "meshes": [
            {{"$type": "demo.Mesh", "name": "kept"}},
            {{"ReferenceGuid": "{MISSING}"}},
            null
        ]}}"#
    );
    let output = read_scene(&json, ContentConfig::default());
    let scene = output.root.read();
    assert_eq!(scene.meshes.len(), 3);
    assert_eq!(scene.meshes[0].as_ref().unwrap().read().name, "kept");
    assert!(scene.meshes[1].is_none());
    assert!(scene.meshes[2].is_none());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].path, "root.meshes");
}

#[test]
fn reference_narrows_to_part() {
    let json = r#"{"$type": "demo.Scene", "meshes": [
        {"$type": "demo.Model",
         "material": {"$type": "demo.Material", "roughness": 0.2},
         "mesh": {"$type": "demo.Mesh", "name": "inner"}}
    ]}"#;
    let output = read_scene(json, ContentConfig::default());
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    let scene = output.root.read();
    assert_eq!(scene.meshes[0].as_ref().unwrap().read().name, "inner");
}

#[test]
fn forward_reference_narrows_after_drain() {
    let json = format!(
        r#"{{"$type": "demo.Scene", "meshes": [
            {{"ReferenceGuid": "{MESH_A}"}},
            {{"$type": "demo.Model", "$id": "{MESH_A}",
              "mesh": {{"$type": "demo.Mesh", "name": "part"}}}}
        ]}}"#
    );
    let output = read_scene(&json, ContentConfig::default());
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    let scene = output.root.read();
    let part = scene.meshes[1].clone().unwrap();
    assert_eq!(part.read().name, "part");
    assert_eq!(scene.meshes[0].as_ref(), Some(&part));
}

#[test]
fn mismatched_reference_is_dropped() {
    let json = r#"{"$type": "demo.Scene", "sky": {"$type": "demo.Mesh", "name": "oops"}}"#;
    let output = read_scene(json, ContentConfig::default());
    assert!(output.root.read().sky.is_none());
    assert!(matches!(
        output.diagnostics[0].kind,
        DiagnosticKind::TypeMismatch {
            expected: "demo.Texture",
            found: "demo.Mesh"
        }
    ));
}

#[test]
fn read_only_field_registers_embedded_object() {
    init_logging();
    let json = format!(
        r#"{{"$type": "demo.Atlas", "gamma": 1.0,
            "preview": {{"$type": "demo.Texture", "$id": "{TEXTURE}", "width": 64}},
            "page": {{"ReferenceGuid": "{TEXTURE}"}}}}"#
    );
    let registry = registry();
    let document = Document::from_json(&json).unwrap();
    let output = pollster::block_on(Reader::new(&registry).read_as::<Atlas>(&document)).unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    let atlas = output.root.read();
    assert!(atlas.preview.is_none());
    let page = atlas.page.as_ref().unwrap();
    assert_eq!(page.identity(), id(TEXTURE));
    assert_eq!(page.read().width, 64);
}

#[test]
fn duplicate_identity_gets_fresh_id() {
    let json = format!(
        r#"{{"$type": "demo.Scene",
            "meshes": [
                {{"$type": "demo.Mesh", "$id": "{MESH_A}", "name": "first"}},
                {{"$type": "demo.Mesh", "$id": "{MESH_A}", "name": "second"}},
                {{"ReferenceGuid": "{MESH_A}"}}
            ]}}"#
    );
    let output = read_scene(&json, ContentConfig::default());
    let scene = output.root.read();
    let first = scene.meshes[0].clone().unwrap();
    let second = scene.meshes[1].clone().unwrap();

    assert_eq!(first.identity(), id(MESH_A));
    assert_ne!(second.identity(), id(MESH_A));
    assert_eq!(second.read().name, "second");
    assert_eq!(scene.meshes[2].as_ref(), Some(&first));
    assert!(matches!(
        output.diagnostics.as_slice(),
        [d] if matches!(d.kind, DiagnosticKind::DuplicateIdentity(dup) if dup == id(MESH_A))
    ));
}
