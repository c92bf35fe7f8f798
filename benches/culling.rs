use criterion::{criterion_group, criterion_main, Criterion, black_box};

use terrastream::core::Camera;
use terrastream::culling::{AlwaysVisible, Bvh, HeightFloorOracle, SpatialCulling};
use terrastream::math::{Aabb, Obb, fit_points};
use terrastream::streaming::chunk_creator::{ChunkCreator, ChunkGridInput};

use glam::{Mat4, Quat, Vec2, Vec3};

/// 20x20 chunk grid of a 2 km region with rolling heights
fn region_boxes() -> Vec<(Aabb, u32)> {
    let input = ChunkGridInput {
        origin: Vec2::ZERO,
        chunk_size: 100.0,
        chunks_per_side: 20,
        bounds: (0..400)
            .map(|i| {
                let base = ((i % 20) as f32 * 0.4).sin() * 60.0 + 200.0;
                (base, base + 25.0)
            })
            .collect(),
        min_height_extent: 1.0,
    };
    ChunkCreator::build_blocking(&input)
        .into_iter()
        .map(|b| (b.aabb, b.index))
        .collect()
}

fn camera() -> Camera {
    Camera::look_at(Vec3::new(1000.0, -200.0, 400.0), Vec3::new(1000.0, 800.0, 200.0), Vec3::Z)
}

fn bench_bvh_build_400(c: &mut Criterion) {
    let boxes = region_boxes();
    c.bench_function("bvh_build_400", |b| {
        b.iter(|| Bvh::build(black_box(boxes.clone())));
    });
}

fn bench_frustum_pass_400(c: &mut Criterion) {
    let mut culling = SpatialCulling::new();
    culling.rebuild(region_boxes());
    let frustum = camera().frustum();

    c.bench_function("frustum_pass_400", |b| {
        b.iter(|| {
            culling.frustum_pass(black_box(frustum.planes()));
            culling.extract().map(|r| r.len()).unwrap_or(0)
        });
    });
}

fn bench_two_stage_cull_400(c: &mut Criterion) {
    let mut culling = SpatialCulling::new();
    culling.rebuild(region_boxes());
    let camera = camera();
    let frustum = camera.frustum();
    let view = camera.view_matrix();
    let view_proj = camera.view_projection();
    let oracle = HeightFloorOracle { height: 230.0 };

    c.bench_function("two_stage_cull_400", |b| {
        b.iter(|| {
            culling
                .run(frustum.planes(), Some(&oracle), &view, &view_proj)
                .map(|r| r.len())
                .unwrap_or(0)
        });
    });

    c.bench_function("frustum_only_run_400", |b| {
        b.iter(|| {
            culling
                .run(frustum.planes(), None::<&AlwaysVisible>, &view, &view_proj)
                .map(|r| r.len())
                .unwrap_or(0)
        });
    });
}

fn bench_obb_sat(c: &mut Criterion) {
    let base = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
    let a = Obb::from_transformed_aabb(&base, &Mat4::from_rotation_z(0.3));
    let pairs: Vec<Obb> = (0..64)
        .map(|i| {
            let t = i as f32 * 0.1;
            let m = Mat4::from_rotation_translation(
                Quat::from_euler(glam::EulerRot::XYZ, t, t * 0.5, t * 0.25),
                Vec3::new(t.sin() * 2.5, t.cos() * 2.5, 0.0),
            );
            Obb::from_transformed_aabb(&base, &m)
        })
        .collect();

    c.bench_function("obb_sat_64_pairs", |b| {
        b.iter(|| pairs.iter().filter(|o| black_box(&a).intersects(o)).count());
    });
}

fn bench_obb_fit(c: &mut Criterion) {
    let rotation = Quat::from_rotation_z(0.6) * Quat::from_rotation_x(0.2);
    let points: Vec<Vec3> = (0..512)
        .map(|i| {
            let t = i as f32;
            rotation * Vec3::new((t * 0.37).sin() * 8.0, (t * 0.11).cos() * 3.0, (t * 0.05).sin())
        })
        .collect();

    c.bench_function("obb_fit_512_points", |b| {
        b.iter(|| fit_points(black_box(&points)));
    });
}

criterion_group!(
    benches,
    bench_bvh_build_400,
    bench_frustum_pass_400,
    bench_two_stage_cull_400,
    bench_obb_sat,
    bench_obb_fit,
);
criterion_main!(benches);
