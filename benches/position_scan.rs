use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mszsession::controlled_vocabulary::{NumericFormat, SourceCompression};
use mszsession::engine::mzml::{plan_divisions, scan_metadata, scan_positions, BinaryDecoder};

fn generate_test_mzml(num_spectra: usize, peaks_per_spectrum: usize) -> Vec<u8> {
    let mut mzml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>
<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">
  <run id="bench_run">
    <spectrumList count=""#);
    mzml.push_str(&num_spectra.to_string());
    mzml.push_str(r#"">"#);

    for i in 0..num_spectra {
        let ms_level = if i % 5 == 0 { 1 } else { 2 };
        let rt = (i as f64) * 0.01;

        let mz_bytes: Vec<u8> = (0..peaks_per_spectrum)
            .map(|j| 100.0 + (j as f64) * 10.0 + (i as f64) * 0.1)
            .flat_map(|v: f64| v.to_le_bytes())
            .collect();
        let intensity_bytes: Vec<u8> = (0..peaks_per_spectrum)
            .map(|j| 1000.0 + (j as f32) * 50.0)
            .flat_map(|v: f32| v.to_le_bytes())
            .collect();

        let mz_base64 =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &mz_bytes);
        let intensity_base64 =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &intensity_bytes);

        mzml.push_str(&format!(
            r#"
      <spectrum index="{}" id="scan={}" defaultArrayLength="{}">
        <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="{}"/>
        <scanList count="1">
          <scan>
            <cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="{}" unitCvRef="UO" unitAccession="UO:0000031" unitName="minute"/>
          </scan>
        </scanList>
        <binaryDataArrayList count="2">
          <binaryDataArray>
            <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float"/>
            <cvParam cvRef="MS" accession="MS:1000576" name="no compression"/>
            <cvParam cvRef="MS" accession="MS:1000514" name="m/z array"/>
            <binary>{}</binary>
          </binaryDataArray>
          <binaryDataArray>
            <cvParam cvRef="MS" accession="MS:1000521" name="32-bit float"/>
            <cvParam cvRef="MS" accession="MS:1000576" name="no compression"/>
            <cvParam cvRef="MS" accession="MS:1000515" name="intensity array"/>
            <binary>{}</binary>
          </binaryDataArray>
        </binaryDataArrayList>
      </spectrum>"#,
            i,
            i + 1,
            peaks_per_spectrum,
            ms_level,
            rt,
            mz_base64,
            intensity_base64
        ));
    }

    mzml.push_str(
        r#"
    </spectrumList>
  </run>
</mzML>"#,
    );

    mzml.into_bytes()
}

fn bench_scan_positions(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_positions");

    for num_spectra in [100, 1000, 5000] {
        let data = generate_test_mzml(num_spectra, 50);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_spectra), &data, |b, data| {
            b.iter(|| {
                let index = scan_positions(black_box(data)).unwrap();
                black_box(index.spectrum_count());
            });
        });
    }

    group.finish();
}

fn bench_scan_metadata(c: &mut Criterion) {
    let data = generate_test_mzml(5000, 50);
    c.bench_function("scan_metadata", |b| {
        b.iter(|| black_box(scan_metadata(black_box(&data)).unwrap()));
    });
}

fn bench_decode_ranges(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_ranges");

    for peaks in [50, 500, 5000] {
        let data = generate_test_mzml(20, peaks);
        let index = scan_positions(&data).unwrap();
        group.throughput(Throughput::Elements((peaks * 20) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(peaks), &data, |b, data| {
            b.iter(|| {
                let mut total = 0usize;
                for ordinal in 0..index.spectrum_count() {
                    let (start, end) = index.mz.range(ordinal).unwrap();
                    let values = BinaryDecoder::decode(
                        &data[start as usize..end as usize],
                        NumericFormat::Float64,
                        SourceCompression::None,
                    )
                    .unwrap();
                    total += values.len();
                }
                black_box(total);
            });
        });
    }

    group.finish();
}

fn bench_plan_divisions(c: &mut Criterion) {
    let data = generate_test_mzml(5000, 50);
    let index = scan_positions(&data).unwrap();
    c.bench_function("plan_divisions", |b| {
        b.iter(|| black_box(plan_divisions(black_box(&index), 64 * 1024, 8)));
    });
}

criterion_group!(
    benches,
    bench_scan_positions,
    bench_scan_metadata,
    bench_decode_ranges,
    bench_plan_divisions
);
criterion_main!(benches);
