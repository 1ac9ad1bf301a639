pub mod extractor;
pub mod fetcher;
pub mod selectors;

pub use extractor::SelectorExtractor;
pub use fetcher::ReqwestFetcher;
