//! End-to-end runs of the HTTP fetcher against a local server

use rasterhtml::rendering::BufferSurface;
use rasterhtml::{RasterizeConfig, ResourceError, ResourceType};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tiny_http::{Header, Response, Server};

fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

struct Site {
    base: String,
    requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

/// Serve a small site; every request path and its `X-Marker` header are recorded.
fn start_site(pages: HashMap<&'static str, Vec<u8>>) -> Site {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    std::thread::spawn(move || {
        for req in server.incoming_requests() {
            let url = req.url().to_string();
            let marker = req
                .headers()
                .iter()
                .find(|h| h.field.equiv("X-Marker"))
                .map(|h| h.value.as_str().to_string());
            seen.lock().unwrap().push((url.clone(), marker));

            let path = url.split('?').next().unwrap_or("").to_string();
            let resp = match pages.get(path.as_str()) {
                Some(body) => Response::from_data(body.clone()),
                None => Response::from_string("not found").with_status_code(404),
            };
            let resp = if path.ends_with(".css") {
                resp.with_header("Content-Type: text/css".parse::<Header>().unwrap())
            } else {
                resp
            };
            let _ = req.respond(resp);
        }
    });

    Site {
        base: format!("http://{}", addr),
        requests,
    }
}

fn site_pages() -> HashMap<&'static str, Vec<u8>> {
    let mut pages = HashMap::new();
    pages.insert(
        "/page.html",
        br#"<html><head>
<link rel="stylesheet" href="css/main.css">
<style>@font-face { font-family: "F"; src: url("fonts/f.woff") format("woff"); }</style>
</head><body><img src="img/dot.png"><img src="img/missing.png"></body></html>"#
            .to_vec(),
    );
    pages.insert(
        "/css/main.css",
        b"@import url(\"nested.css\");\nbody { color: red; }".to_vec(),
    );
    pages.insert(
        "/css/nested.css",
        b"div { background-image: url(\"../img/dot.png\"); }".to_vec(),
    );
    pages.insert("/img/dot.png", png_bytes());
    pages.insert("/fonts/f.woff", b"wOFF".to_vec());
    pages
}

#[tokio::test]
async fn test_draw_url_inlines_every_reference() {
    if std::env::var("CI").is_ok() {
        return;
    }

    let site = start_site(site_pages());
    let rasterizer = rasterhtml::new_rasterizer(RasterizeConfig::default()).unwrap();
    let mut surface = BufferSurface::new(120, 90);

    let url = format!("{}/page.html", site.base);
    let rendered = rasterizer.draw_url(&url, Some(&mut surface)).await;

    assert_eq!(
        rendered.errors,
        vec![ResourceError::for_url(
            ResourceType::Image,
            format!("{}/img/missing.png", site.base)
        )]
    );
    let image = rendered.image.expect("rendered");
    assert_eq!((image.width, image.height), (120, 90));
    assert!(!image.svg.contains("main.css"));
    assert!(!image.svg.contains("nested.css"));
    assert!(!image.svg.contains("fonts/f.woff"));
    assert!(image.svg.contains("data:font/woff;base64,d09GRg=="));
    assert!(image.svg.contains("color: red"));
    assert_eq!(image.svg.matches("data:image/png;base64,").count(), 2);
    assert_eq!(surface.placements().len(), 1);
}

#[tokio::test]
async fn test_cache_busting_and_custom_headers() {
    if std::env::var("CI").is_ok() {
        return;
    }

    let site = start_site(site_pages());
    let mut headers = HashMap::new();
    headers.insert("X-Marker".to_string(), "yes".to_string());
    let config = RasterizeConfig {
        cache: false,
        headers,
        ..Default::default()
    };
    let rasterizer = rasterhtml::new_rasterizer(config).unwrap();

    rasterizer
        .draw_url(&format!("{}/page.html", site.base), None)
        .await;

    let requests = site.requests.lock().unwrap().clone();
    assert!(requests.len() >= 6);
    for (url, marker) in &requests {
        assert!(url.contains("?_="), "{} was not cache-busted", url);
        assert_eq!(marker.as_deref(), Some("yes"));
    }
}

#[tokio::test]
async fn test_unreachable_page() {
    if std::env::var("CI").is_ok() {
        return;
    }

    let site = start_site(HashMap::new());
    let url = format!("{}/nowhere.html", site.base);

    let rendered = rasterhtml::draw_url(&url, None, RasterizeConfig::default())
        .await
        .unwrap();

    assert!(rendered.image.is_none());
    assert_eq!(rendered.errors.len(), 1);
    assert_eq!(rendered.errors[0].resource_type, ResourceType::Page);
    assert_eq!(
        rendered.errors[0].msg.as_deref(),
        Some(format!("Unable to load page {}", url).as_str())
    );
}

#[test]
fn test_invalid_header_is_a_config_error() {
    let mut headers = HashMap::new();
    headers.insert("bad header".to_string(), "x".to_string());
    let config = RasterizeConfig {
        headers,
        ..Default::default()
    };
    assert!(matches!(
        rasterhtml::new_rasterizer(config),
        Err(rasterhtml::Error::Config(_))
    ));
}
