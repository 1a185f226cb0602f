mod cache_serializer_port;
mod image_processor_port;
mod request_modifier_port;
mod transport_port;

pub use cache_serializer_port::CacheSerializer;
pub use image_processor_port::ImageProcessor;
pub use request_modifier_port::RequestModifier;
pub use transport_port::{DownloadRequest, TransportPort, TransportResponse};

#[cfg(test)]
pub use transport_port::MockTransportPort;
