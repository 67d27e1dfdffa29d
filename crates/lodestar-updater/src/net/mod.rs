mod download;

pub use download::{rewrite_to_proxy, Downloader, ReqwestTransport, Transport};
