mod result;
mod sample;
mod scraper;

#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use result::{ScrapeResult, SeriesKey};
pub use sample::{MetricSample, SampleParseError};
pub use scraper::{Scraper, METRICS_PATH};
