use criterion::{black_box, criterion_group, criterion_main, Criterion};
use oerm::block::{decode_block, encode_block, BlockKind};
use oerm::codec::Compressor;
use oerm::container::PageContainer;
use oerm::crypto::CipherSuite;

fn report_pages(count: usize) -> Vec<String> {
    (1..=count)
        .map(|n| {
            let mut page = format!("1 LISTADO DE SALDOS    HOJA {n:>6}\n");
            for cuenta in 0..60 {
                page.push_str(&format!(
                    " CUENTA {:04}-{:03}  SALDO {:>12},00\n",
                    n,
                    cuenta,
                    cuenta * 117
                ));
            }
            page
        })
        .collect()
}

fn container_bytes() -> (Vec<u8>, Vec<u8>) {
    let mut container = PageContainer::new(10);
    for page in report_pages(10) {
        container.add(&page).unwrap();
    }
    container.dump().unwrap()
}

fn bench_container_dump(c: &mut Criterion) {
    let pages = report_pages(10);

    c.bench_function("container_dump_10_pages", |b| {
        b.iter(|| {
            let mut container = PageContainer::new(10);
            for page in &pages {
                container.add(black_box(page)).unwrap();
            }
            container.dump().unwrap()
        })
    });
}

fn bench_encode_block(c: &mut Criterion) {
    let (data, shape) = container_bytes();
    let mut plain = CipherSuite::new(0, None).unwrap();

    for (name, id) in [("gzip", 1u8), ("lz4", 4), ("zstd", 10)] {
        let compressor = Compressor::new(id, 1);
        c.bench_function(&format!("encode_pages_block_{}", name), |b| {
            b.iter(|| {
                encode_block(
                    BlockKind::Pages,
                    &compressor,
                    &mut plain,
                    black_box(&data),
                    &shape,
                )
                .unwrap()
            })
        });
    }
}

fn bench_encode_encrypted(c: &mut Criterion) {
    let (data, shape) = container_bytes();
    let compressor = Compressor::new(10, 1);
    // key derivation happens here, not inside the measured loop
    let mut aes = CipherSuite::new(1, Some("bench")).unwrap();

    c.bench_function("encode_pages_block_zstd_aes", |b| {
        b.iter(|| {
            encode_block(
                BlockKind::Pages,
                &compressor,
                &mut aes,
                black_box(&data),
                &shape,
            )
            .unwrap()
        })
    });
}

fn bench_decode_block(c: &mut Criterion) {
    let (data, shape) = container_bytes();
    let compressor = Compressor::new(10, 1);
    let mut plain = CipherSuite::new(0, None).unwrap();
    let encoded = encode_block(BlockKind::Pages, &compressor, &mut plain, &data, &shape).unwrap();

    c.bench_function("decode_pages_block_zstd", |b| {
        b.iter(|| decode_block(black_box(&encoded), &mut plain, 0).unwrap())
    });
}

criterion_group!(
    benches,
    bench_container_dump,
    bench_encode_block,
    bench_encode_encrypted,
    bench_decode_block
);
criterion_main!(benches);
