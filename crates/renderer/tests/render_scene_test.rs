//! Scene conversion into set passes and uniform slots.

mod common;

use common::*;
use forge_renderer::ubo::{SHADOW_SCENE_RADIUS, directional_shadow_matrix};
use forge_renderer::{RenderError, RenderScene, SlotKind};
use forge_resources::{Material, Mesh, ResourceId, ResourceTable, SubMesh};
use forge_scene::{Camera, Entity, Light, MeshRenderer, Scene, Transform};
use glam::{Mat4, Vec3, Vec4};

fn render_scene() -> RenderScene {
    RenderScene::new(4, 16, 4)
}

#[test]
fn test_drawcalls_grouped_by_material() {
    let mut table = ResourceTable::new();
    let a = add_test_mesh(&mut table, 36);
    let b = add_test_mesh(&mut table, 6);

    let mut scene = Scene::new();
    scene.spawn(Entity::new("a1").with_mesh_renderer(MeshRenderer::new(a.mesh, vec![a.material])));
    scene.spawn(Entity::new("b1").with_mesh_renderer(MeshRenderer::new(b.mesh, vec![b.material])));
    scene.spawn(Entity::new("a2").with_mesh_renderer(MeshRenderer::new(a.mesh, vec![a.material])));

    let mut rs = render_scene();
    rs.convert(&scene, &table).unwrap();

    let passes = rs.set_passes();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].material, a.material);
    assert_eq!(passes[0].pipeline, a.pipeline);
    assert_eq!(passes[0].drawcalls.len(), 2);
    assert_eq!(passes[1].material, b.material);
    assert_eq!(passes[1].drawcalls[0].index_count, 6);

    let slots: Vec<u32> = passes[0].drawcalls.iter().map(|d| d.uniform_slot).collect();
    assert_eq!(slots, vec![0, 2]);
    assert_eq!(rs.object_count(), 3);
    assert_eq!(rs.drawcall_count(), 3);
}

#[test]
fn test_object_uniform_uses_world_matrix() {
    let mut table = ResourceTable::new();
    let mesh = add_test_mesh(&mut table, 3);
    let offset = Vec3::new(1.0, 2.0, 3.0);

    let mut scene = Scene::new();
    scene.spawn(
        Entity::new("moved")
            .with_transform(Transform::new().with_position(offset))
            .with_mesh_renderer(MeshRenderer::new(mesh.mesh, vec![mesh.material])),
    );

    let mut rs = render_scene();
    rs.convert(&scene, &table).unwrap();
    assert_eq!(rs.object(0).unwrap().world, Mat4::from_translation(offset));
}

#[test]
fn test_submeshes_reuse_last_material() {
    let mut table = ResourceTable::new();
    let base = add_test_mesh(&mut table, 3);
    let submesh = SubMesh {
        vertex_buffer: table.allocate(Blob),
        index_buffer: table.allocate(Blob),
        index_count: 9,
    };
    let mesh = table.allocate(Mesh::new(vec![submesh, submesh]));

    let mut scene = Scene::new();
    scene.spawn(Entity::new("two").with_mesh_renderer(MeshRenderer::new(mesh, vec![base.material])));

    let mut rs = render_scene();
    rs.convert(&scene, &table).unwrap();
    assert_eq!(rs.set_passes().len(), 1);
    assert_eq!(rs.set_passes()[0].drawcalls.len(), 2);
    assert_eq!(rs.object_count(), 1);
}

#[test]
fn test_invalid_mesh_and_material_are_skipped() {
    let mut table = ResourceTable::new();
    let good = add_test_mesh(&mut table, 3);
    let not_a_material = table.allocate(Blob);

    let mut scene = Scene::new();
    scene.spawn(Entity::new("ghost").with_mesh_renderer(MeshRenderer::new(
        ResourceId::from_index(999),
        vec![good.material],
    )));
    scene.spawn(
        Entity::new("wrong").with_mesh_renderer(MeshRenderer::new(good.mesh, vec![not_a_material])),
    );
    scene.spawn(Entity::new("good").with_mesh_renderer(MeshRenderer::new(good.mesh, vec![good.material])));

    let mut rs = render_scene();
    rs.convert(&scene, &table).unwrap();
    assert_eq!(rs.set_passes().len(), 1);
    assert_eq!(rs.drawcall_count(), 1);
}

#[test]
fn test_destroyed_material_is_skipped_after_flush() {
    let mut table = ResourceTable::new();
    let mesh = add_test_mesh(&mut table, 3);
    let scene = test_scene(&mesh);
    let mut rs = render_scene();

    table.destroy(mesh.material);
    rs.convert(&scene, &table).unwrap();
    assert_eq!(rs.drawcall_count(), 1, "Still live until flushed");

    table.flush();
    rs.convert(&scene, &table).unwrap();
    assert_eq!(rs.drawcall_count(), 0);
}

#[test]
fn test_main_camera_slot() {
    let mut table = ResourceTable::new();
    let mesh = add_test_mesh(&mut table, 3);
    let mut rs = render_scene();

    rs.convert(&Scene::new(), &table).unwrap();
    assert_eq!(rs.main_camera_slot(), None);

    rs.convert(&test_scene(&mesh), &table).unwrap();
    let slot = rs.main_camera_slot().unwrap();
    assert_eq!(slot, 0);
    let camera = rs.camera(slot).unwrap();
    assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-5));
}

#[test]
fn test_camera_slots_restart_each_convert() {
    let table = ResourceTable::new();
    let mut rs = RenderScene::new(1, 4, 4);
    let camera = Camera::default();

    assert_eq!(rs.set_camera_data(&camera, Mat4::IDENTITY).unwrap(), 0);
    assert!(matches!(
        rs.set_camera_data(&camera, Mat4::IDENTITY),
        Err(RenderError::SceneTooLarge {
            kind: SlotKind::Cameras,
            capacity: 1
        })
    ));

    rs.convert(&Scene::new(), &table).unwrap();
    assert_eq!(rs.set_camera_data(&camera, Mat4::IDENTITY).unwrap(), 0);
}

#[test]
fn test_object_slots_overflow() {
    let mut table = ResourceTable::new();
    let mesh = add_test_mesh(&mut table, 3);
    let mut scene = Scene::new();
    for _ in 0..3 {
        scene.spawn(Entity::new("cube").with_mesh_renderer(MeshRenderer::new(mesh.mesh, vec![mesh.material])));
    }

    let mut rs = RenderScene::new(1, 2, 1);
    let err = rs.convert(&scene, &table).unwrap_err();
    assert!(matches!(
        err,
        RenderError::SceneTooLarge {
            kind: SlotKind::Objects,
            capacity: 2
        }
    ));
}

#[test]
fn test_lights_collected_and_bounded() {
    let table = ResourceTable::new();
    let mut scene = Scene::new();
    scene.environment.ambient_color = Vec3::splat(0.2);
    scene.spawn(Entity::new("sun").with_light(Light::directional(Vec3::ONE, 2.0)));
    let mut disabled = Light::point(Vec3::X, 1.0, 5.0);
    disabled.enabled = false;
    scene.spawn(Entity::new("off").with_light(disabled));

    let mut rs = RenderScene::new(1, 1, 1);
    rs.convert(&scene, &table).unwrap();
    assert_eq!(rs.lighting().len(), 1);
    assert_eq!(rs.lighting().ambient_color, Vec3::splat(0.2));
    assert_eq!(rs.lighting().lights[0].kind_tag(), 0);

    scene.spawn(Entity::new("lamp").with_light(Light::point(Vec3::ONE, 1.0, 5.0)));
    assert!(matches!(
        rs.convert(&scene, &table),
        Err(RenderError::SceneTooLarge {
            kind: SlotKind::Lights,
            capacity: 1
        })
    ));
}

#[test]
fn test_material_texture_carried_into_set_pass() {
    let mut table = ResourceTable::new();
    let mesh = add_test_mesh(&mut table, 3);
    let texture = table.allocate(Blob);
    let material = table.allocate(Material::new(mesh.pipeline).with_texture(texture));

    let mut scene = Scene::new();
    scene.spawn(Entity::new("textured").with_mesh_renderer(MeshRenderer::new(mesh.mesh, vec![material])));

    let mut rs = render_scene();
    rs.convert(&scene, &table).unwrap();
    assert_eq!(rs.set_passes()[0].texture, Some(texture));
}

#[test]
fn test_last_directional_light_casts_shadows() {
    let table = ResourceTable::new();
    let mut scene = Scene::new();
    scene.spawn(Entity::new("lamp").with_light(Light::point(Vec3::ONE, 1.0, 5.0)));

    let mut rs = RenderScene::new(1, 1, 4);
    rs.convert(&scene, &table).unwrap();
    assert_eq!(rs.lighting().light_view_projection, None);

    scene.spawn(
        Entity::new("sun")
            .with_transform(Transform::new().looking_at(Vec3::new(0.0, -1.0, -1.0)))
            .with_light(Light::directional(Vec3::ONE, 2.0)),
    );
    scene.spawn(
        Entity::new("moon")
            .with_transform(Transform::new().looking_at(Vec3::new(1.0, -1.0, 0.0)))
            .with_light(Light::directional(Vec3::splat(0.2), 0.5)),
    );
    rs.convert(&scene, &table).unwrap();

    let moon = rs.lighting().lights[2].direction.truncate();
    let expected = directional_shadow_matrix(moon, Vec3::ZERO, SHADOW_SCENE_RADIUS);
    assert_eq!(rs.lighting().light_view_projection, Some(expected));

    rs.convert(&Scene::new(), &table).unwrap();
    assert_eq!(rs.lighting().light_view_projection, None);
}

#[test]
fn test_set_pass_carries_material_factors() {
    let mut table = ResourceTable::new();
    let mesh = add_test_mesh(&mut table, 3);
    let mut tinted = Material::new(mesh.pipeline).with_base_color(Vec4::new(0.2, 0.4, 0.6, 1.0));
    tinted.metallic = 0.9;
    tinted.roughness = 0.1;
    let material = table.allocate(tinted);

    let mut scene = Scene::new();
    scene.spawn(Entity::new("tinted").with_mesh_renderer(MeshRenderer::new(mesh.mesh, vec![material])));

    let mut rs = render_scene();
    rs.convert(&scene, &table).unwrap();
    let surface = rs.set_passes()[0].surface;
    assert_eq!(surface.base_color, Vec4::new(0.2, 0.4, 0.6, 1.0));
    assert_eq!(surface.metallic, 0.9);
    assert_eq!(surface.roughness, 0.1);
}
