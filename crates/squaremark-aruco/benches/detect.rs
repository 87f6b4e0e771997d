use criterion::{black_box, criterion_group, criterion_main, Criterion};
use squaremark_aruco::{extract_candidates, DetectorParams, MarkerDetector, PredefinedDictionary};
use squaremark_core::GrayImage;

/// A 1280x960 canvas with a 4x3 grid of 6x6 markers.
fn make_fixture() -> GrayImage {
    let dict = PredefinedDictionary::AprilTag36h11
        .dictionary()
        .expect("36h11 is bundled");
    let mut canvas = GrayImage::filled(1280, 960, 240);
    for row in 0..3 {
        for col in 0..4 {
            let id = (row * 4 + col) as u32;
            let Ok(marker) = dict.draw_marker(id, 200) else {
                continue;
            };
            let (x0, y0) = (60 + col * 300, 60 + row * 300);
            for y in 0..marker.height {
                for x in 0..marker.width {
                    canvas.set(x0 + x, y0 + y, marker.get(x, y));
                }
            }
        }
    }
    canvas
}

fn bench_detect(c: &mut Criterion) {
    let img = make_fixture();
    let params = DetectorParams::default();
    let detector = MarkerDetector::new(
        PredefinedDictionary::AprilTag36h11
            .dictionary()
            .expect("36h11 is bundled")
            .clone(),
        params.clone(),
    );

    c.bench_function("candidates_1280x960", |b| {
        b.iter(|| {
            let cands = extract_candidates(black_box(&img.view()), black_box(&params));
            black_box(cands.len())
        })
    });

    c.bench_function("detect_1280x960_12_markers", |b| {
        b.iter(|| {
            let result = detector.detect(black_box(&img.view()));
            black_box(result.map(|r| r.markers.len()).unwrap_or(0))
        })
    });
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
