use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat as EncodeFormat, Rgba, RgbaImage};
use reqwest::Url;
use tempfile::TempDir;
use tokio::sync::{Semaphore, oneshot};

use pixcache::domain::ports::{DownloadRequest, TransportResponse};
use pixcache::domain::{DownloadError, ImageProcessor, TransportPort};
use pixcache::infrastructure::image::{DiskCacheConfig, MemoryCacheConfig, ResizeProcessor};
use pixcache::infrastructure::{ImageCache, ImageDownloader};
use pixcache::{
    CacheKey, CacheType, CallbackQueue, ImageRetriever, Resource, RetrievalOptions,
    RetrieveError, TaskState,
};

struct CountingTransport {
    body: Bytes,
    opened: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl CountingTransport {
    fn new(body: Bytes) -> Self {
        Self {
            body,
            opened: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn gated(body: Bytes, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(body)
        }
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportPort for CountingTransport {
    async fn open(&self, _request: DownloadRequest) -> Result<TransportResponse, DownloadError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| DownloadError::transport(e.to_string()))?
                .forget();
        }
        let half = self.body.len() / 2;
        Ok(TransportResponse::from_chunks(vec![
            self.body.slice(..half),
            self.body.slice(half..),
        ]))
    }
}

fn png(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, EncodeFormat::Png)
        .expect("encode png");
    Bytes::from(out.into_inner())
}

fn url(path: &str) -> Url {
    Url::parse(&format!("https://images.test/{path}")).expect("valid url")
}

async fn setup(body: Bytes) -> (ImageRetriever, Arc<CountingTransport>, TempDir) {
    setup_with(CountingTransport::new(body)).await
}

async fn setup_with(
    transport: CountingTransport,
) -> (ImageRetriever, Arc<CountingTransport>, TempDir) {
    let temp = TempDir::new().expect("temp dir");
    let cache = ImageCache::open(
        MemoryCacheConfig::default(),
        temp.path().join("images"),
        DiskCacheConfig::default(),
    )
    .await
    .expect("open cache");
    let transport = Arc::new(transport);
    let downloader = ImageDownloader::new(Arc::clone(&transport) as Arc<dyn TransportPort>);
    let retriever = ImageRetriever::new(Arc::new(cache), downloader)
        .with_callback_queue(CallbackQueue::Immediate);
    (retriever, transport, temp)
}

#[tokio::test]
async fn network_then_memory_then_disk() {
    let (retriever, transport, _temp) = setup(png(8, 6)).await;
    let resource = Resource::from_url(url("a.png"));

    let first = retriever
        .retrieve_async(resource.clone(), RetrievalOptions::default())
        .await
        .expect("downloaded");
    assert_eq!(first.cache_type, CacheType::None);
    assert_eq!((first.image.width(), first.image.height()), (8, 6));

    let second = retriever
        .retrieve_async(resource.clone(), RetrievalOptions::default())
        .await
        .expect("memory hit");
    assert_eq!(second.cache_type, CacheType::Memory);

    retriever.cache().flush().await;
    retriever.clear_memory_cache();
    assert_eq!(
        retriever.cached_type(resource.cache_key()).await,
        CacheType::Disk
    );

    let third = retriever
        .retrieve_async(resource, RetrievalOptions::default())
        .await
        .expect("disk hit");
    assert_eq!(third.cache_type, CacheType::Disk);
    assert_eq!(transport.opened(), 1);
}

#[tokio::test]
async fn concurrent_requests_share_a_download() {
    let gate = Arc::new(Semaphore::new(0));
    let (retriever, transport, _temp) =
        setup_with(CountingTransport::gated(png(4, 4), Arc::clone(&gate))).await;
    let resource = Resource::from_url(url("shared.png"));

    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    let a = retriever.retrieve(resource.clone(), RetrievalOptions::default(), None, move |r| {
        let _ = first_tx.send(r);
    });
    let b = retriever.retrieve(resource, RetrievalOptions::default(), None, move |r| {
        let _ = second_tx.send(r);
    });
    while a.state() != TaskState::Fetching || b.state() != TaskState::Fetching {
        tokio::task::yield_now().await;
    }
    gate.add_permits(1);

    let a = first_rx.await.expect("delivered").expect("first");
    let b = second_rx.await.expect("delivered").expect("second");
    assert_eq!(a.image.width(), b.image.width());
    assert_eq!(a.cache_type, CacheType::None);
    assert_eq!(b.cache_type, CacheType::None);
    assert_eq!(transport.opened(), 1);
}

#[tokio::test]
async fn same_key_on_two_urls_downloads_twice() {
    let (retriever, transport, _temp) = setup(png(4, 4)).await;

    let (a, b) = tokio::join!(
        retriever.retrieve_async(
            Resource::new("logo", url("logo.png")),
            RetrievalOptions::default().force_refresh()
        ),
        retriever.retrieve_async(
            Resource::new("logo", url("mirror/logo.png")),
            RetrievalOptions::default().force_refresh()
        ),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(transport.opened(), 2);
}

#[tokio::test]
async fn only_from_cache_reports_miss_without_network() {
    let (retriever, transport, _temp) = setup(png(4, 4)).await;

    let result = retriever
        .retrieve_async(
            Resource::from_url(url("missing.png")),
            RetrievalOptions::default().only_from_cache(),
        )
        .await;

    assert!(matches!(result, Err(RetrieveError::CacheMiss { .. })));
    assert_eq!(transport.opened(), 0);
}

#[tokio::test]
async fn processed_variant_is_cached_separately() {
    let (retriever, transport, _temp) = setup(png(20, 10)).await;
    let resource = Resource::new("banner", url("banner.png"));
    let options =
        RetrievalOptions::default().with_processor(ResizeProcessor::new(10, 10).aspect_fit());

    let result = retriever
        .retrieve_async(resource.clone(), options.clone())
        .await
        .expect("processed");
    assert_eq!((result.image.width(), result.image.height()), (10, 5));

    retriever.cache().flush().await;
    let processed_key = resource
        .cache_key()
        .processed(&ResizeProcessor::new(10, 10).aspect_fit().identifier());
    assert_ne!(processed_key, CacheKey::new("banner"));
    assert_eq!(
        retriever.cache().cached_type(&processed_key).await,
        CacheType::Memory
    );
    assert_eq!(
        retriever.cached_type(&CacheKey::new("banner")).await,
        CacheType::None
    );
    assert_eq!(transport.opened(), 1);
}
