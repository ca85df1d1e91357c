//! Benchmark for dirty propagation and the per-frame sync pass.
//!
//! Run with: cargo bench --package oroboros_objects --bench sync_pass_benchmark

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use oroboros_objects::{
    CoreCounterpart, CoreObject, CoreObjectId, CoreObjectManager, CoreSource, CreateOptions,
    DirtyFlags, ObjectResult,
};
use oroboros_sync::{CoreSyncData, FrameAlloc, SharedCommandQueue};
use std::any::Any;
use std::sync::Arc;

const TRANSFORM: DirtyFlags = DirtyFlags::bit(0);

struct Transform {
    position: [f32; 3],
    parent: Option<CoreObjectId>,
}

struct TransformCore {
    position: [f32; 3],
}

impl CoreSource for Transform {
    fn create_counterpart(&self) -> ObjectResult<Box<dyn CoreCounterpart>> {
        Ok(Box::new(TransformCore {
            position: self.position,
        }))
    }

    fn sync_to_core(&self, _dirty: DirtyFlags, alloc: &mut FrameAlloc) -> CoreSyncData {
        let mut writer = alloc.writer(12);
        writer.write(&self.position);
        writer.finish()
    }

    fn core_dependencies(&self) -> Vec<CoreObjectId> {
        self.parent.into_iter().collect()
    }
}

impl CoreCounterpart for TransformCore {
    fn apply_sync_data(&mut self, data: &CoreSyncData) {
        if let Some(position) = data.reader().read::<[f32; 3]>() {
            self.position = position;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Builds `count` transforms, each parented to the previous one.
fn build_chain(manager: &CoreObjectManager, count: usize) -> Vec<CoreObject<Transform>> {
    let mut objects: Vec<CoreObject<Transform>> = Vec::with_capacity(count);
    for i in 0..count {
        let parent = objects.last().map(CoreObject::id);
        let object = manager.create(
            Transform {
                position: [i as f32, 0.0, 0.0],
                parent,
            },
            CreateOptions::local(),
        );
        object.initialize().unwrap();
        objects.push(object);
    }
    objects
}

fn benchmark_sync_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_pass");

    for count in [100_usize, 1_000] {
        let manager = CoreObjectManager::new(Arc::new(SharedCommandQueue::for_current_thread()));
        let objects = build_chain(&manager, count);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                for object in &objects {
                    object.modify(TRANSFORM, |t| t.position[1] += 1.0);
                }
                let stats = manager.sync_to_core();
                let _ = manager.queue().flush_and_playback(|_| {});
                black_box(stats)
            });
        });
    }
    group.finish();
}

fn benchmark_propagation(c: &mut Criterion) {
    let manager = CoreObjectManager::new(Arc::new(SharedCommandQueue::for_current_thread()));
    let objects = build_chain(&manager, 256);

    c.bench_function("propagate_chain_256", |b| {
        b.iter(|| black_box(objects[0].mark_dependencies_dirty(TRANSFORM)));
    });
}

criterion_group!(benches, benchmark_sync_pass, benchmark_propagation);
criterion_main!(benches);
