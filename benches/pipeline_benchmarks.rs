use criterion::{Criterion, black_box, criterion_group, criterion_main};
use head_tracker::{
    CalibrationRecord, EulerAngles, Framer, Fusion, FusionPipeline, GyroOffset, Imu,
    PipelineSettings, output_orientation, store,
};
use nalgebra::{Matrix3, Vector3};
use rand::prelude::*;
use rand_pcg::Pcg64;
use std::f32::consts::PI;

// Pre-generated sensor data to eliminate RNG overhead during benchmarks
struct PreGeneratedData {
    samples: Vec<(Vector3<f32>, Vector3<f32>, Vector3<f32>)>,
    index: usize,
}

impl PreGeneratedData {
    fn new(count: usize, seed: u64) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut samples = Vec::with_capacity(count);

        for i in 0..count {
            let time = i as f32 * 0.005; // 200Hz sample rate
            let motion_phase = time * 0.5 * 2.0 * PI;

            let gyroscope = Vector3::new(
                0.2 * motion_phase.sin() + rng.random_range(-0.01..0.01),
                0.2 * (motion_phase * 1.3).cos() + rng.random_range(-0.01..0.01),
                0.2 * (motion_phase * 0.7).sin() + rng.random_range(-0.01..0.01),
            );

            let accelerometer = Vector3::new(
                -0.1 * motion_phase.sin() + rng.random_range(-0.002..0.002),
                0.1 * motion_phase.cos() + rng.random_range(-0.002..0.002),
                1.0 + rng.random_range(-0.002..0.002),
            );

            let magnetometer = Vector3::new(
                0.6 + 0.05 * motion_phase.cos() + rng.random_range(-0.05..0.05),
                0.05 * motion_phase.sin() + rng.random_range(-0.05..0.05),
                -0.8 + rng.random_range(-0.05..0.05),
            );

            samples.push((gyroscope, accelerometer, magnetometer));
        }

        Self { samples, index: 0 }
    }

    fn next(&mut self) -> (Vector3<f32>, Vector3<f32>, Vector3<f32>) {
        let sample = self.samples[self.index];
        self.index = (self.index + 1) % self.samples.len();
        sample
    }
}

/// Sensor driver fake fed from pre-generated data
struct ReplayImu {
    data: PreGeneratedData,
    current: (Vector3<f32>, Vector3<f32>, Vector3<f32>),
}

impl ReplayImu {
    fn new(seed: u64) -> Self {
        let mut data = PreGeneratedData::new(1000, seed);
        let current = data.next();
        Self { data, current }
    }

    fn advance(&mut self) {
        self.current = self.data.next();
    }
}

impl Imu for ReplayImu {
    fn gyroscope(&mut self) -> Option<Vector3<f32>> {
        Some(self.current.0)
    }

    fn accelerometer(&mut self) -> Option<Vector3<f32>> {
        Some(self.current.1)
    }

    fn magnetometer(&mut self) -> Option<Vector3<f32>> {
        Some(self.current.2)
    }
}

/// Cheap complementary stand-in for the real fusion algorithm so the
/// benchmark isolates the pipeline's own cost
struct IntegratingFusion {
    euler: Vector3<f32>,
}

impl IntegratingFusion {
    fn new() -> Self {
        Self {
            euler: Vector3::zeros(),
        }
    }
}

impl Fusion for IntegratingFusion {
    fn update(
        &mut self,
        gyroscope: Vector3<f32>,
        _accelerometer: Vector3<f32>,
        _magnetometer: Vector3<f32>,
        delta_time: f32,
    ) {
        self.euler += gyroscope * delta_time;
    }

    fn euler_angles(&self) -> EulerAngles {
        EulerAngles::new(self.euler.x, self.euler.y, self.euler.z)
    }
}

struct PassthroughOffset;

impl GyroOffset for PassthroughOffset {
    fn update(&mut self, gyroscope: Vector3<f32>) -> Vector3<f32> {
        gyroscope
    }
}

fn calibrated_record() -> CalibrationRecord {
    let mut record = CalibrationRecord::default();
    record.valid = true;
    record.gyroscope_offset = Vector3::new(0.02, -0.01, 0.005);
    record.accelerometer_sensitivity = Vector3::new(0.998, 1.002, 0.999);
    record.accelerometer_offset = Vector3::new(0.01, -0.005, 0.002);
    record.hard_iron_offset = Vector3::new(0.1, -0.05, 0.2);
    record.soft_iron_matrix = Matrix3::from_diagonal(&Vector3::new(1.02, 0.98, 1.01));
    record
}

/// Benchmark one full pipeline tick: poll, calibrate, fuse
fn bench_pipeline_update(c: &mut Criterion) {
    let mut pipeline = FusionPipeline::new(
        calibrated_record(),
        IntegratingFusion::new(),
        PassthroughOffset,
        PipelineSettings {
            apply_magnetic_correction: true,
        },
    );
    let mut imu = ReplayImu::new(42);
    let mut now_us = 0u64;

    c.bench_function("pipeline_update", |b| {
        b.iter(|| {
            imu.advance();
            now_us += 5_000;
            black_box(pipeline.update(&mut imu, black_box(now_us)))
        })
    });
}

/// Benchmark orientation remap plus frame encoding
fn bench_frame_encode(c: &mut Criterion) {
    let mut framer = Framer::new();
    let euler = EulerAngles::new(12.5, -3.0, 175.0);

    c.bench_function("frame_encode", |b| {
        b.iter(|| {
            let frame = framer.frame(output_orientation(black_box(euler)));
            black_box(frame.to_bytes())
        })
    });
}

/// Benchmark calibration record serialization for persistence
fn bench_record_encode(c: &mut Criterion) {
    let record = calibrated_record();

    c.bench_function("record_encode", |b| {
        b.iter(|| black_box(store::encode(black_box(&record))))
    });

    let bytes = store::encode(&record);
    c.bench_function("record_decode", |b| {
        b.iter(|| black_box(store::decode(black_box(&bytes))))
    });
}

criterion_group!(
    benches,
    bench_pipeline_update,
    bench_frame_encode,
    bench_record_encode
);
criterion_main!(benches);
