use criterion::{criterion_group, criterion_main, Criterion};
use futures::future::BoxFuture;
use futures::FutureExt;
use rasterhtml::fetch::{FetchOptions, Fetcher, ImageDecoder};
use rasterhtml::util::data_uri;
use rasterhtml::{inline_references, Document, InlineContext, InlineOptions, Result};

// Every URL resolves to a small stylesheet that pulls in one background image.
struct MemoryFetcher;

impl Fetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str, _options: FetchOptions) -> BoxFuture<'a, Result<Vec<u8>>> {
        async move {
            let body = if url.ends_with(".css") {
                b"div { background-image: url(\"bg.png\"); color: red; }".to_vec()
            } else {
                b"pixels".to_vec()
            };
            Ok(body)
        }
        .boxed()
    }
}

struct WrapDecoder;

impl ImageDecoder for WrapDecoder {
    fn decode<'a>(&'a self, _url: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<String>> {
        async move { Ok(data_uri("image/png", &bytes)) }.boxed()
    }
}

fn page(links: usize, images: usize) -> String {
    let mut html = String::from("<html><head>");
    for i in 0..links {
        html.push_str(&format!("<link rel=\"stylesheet\" href=\"/s{}.css\">", i));
    }
    html.push_str("</head><body>");
    for i in 0..images {
        html.push_str(&format!("<img src=\"/i{}.png\">", i));
    }
    html.push_str("</body></html>");
    html
}

fn bench_inline_references(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");
    let html = page(16, 32);

    c.bench_function("inline_references_16_css_32_img", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut doc = Document::parse_with_base(&html, "http://bench.test/");
                let ctx = InlineContext::new(&MemoryFetcher, &WrapDecoder, InlineOptions::default());
                let errors = inline_references(&mut doc, &ctx).await;
                assert!(errors.is_empty());
            })
        })
    });
}

fn bench_xhtml_envelope(c: &mut Criterion) {
    let doc = Document::parse(&page(0, 256));

    c.bench_function("svg_envelope_256_img", |b| {
        b.iter(|| rasterhtml::rendering::svg_for_document(&doc, 800, 600))
    });
}

criterion_group!(benches, bench_inline_references, bench_xhtml_envelope);
criterion_main!(benches);
