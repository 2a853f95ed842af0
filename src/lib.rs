pub mod cli;
pub mod colordb;
pub mod config;
pub mod descriptor;
pub mod distance;
pub mod error;
pub mod index;
pub mod indexer;
pub mod pixels;
pub mod region;
pub mod search;
pub mod utils;

pub use colordb::{ColorDB, ColorDBBuilder};
pub use config::Opts;
pub use descriptor::{DescriptorConfig, DescriptorPipeline, Quantization, Query};
pub use distance::{DistanceConfig, DistanceMetric};
pub use error::{Error, Result};
pub use index::FeatureIndex;
pub use indexer::{IndexReport, Indexer, SourceImage};
pub use pixels::PixelBuffer;
pub use region::{Region, RegionPartitioner};
pub use search::{Neighbor, SearchParams, Searcher};
