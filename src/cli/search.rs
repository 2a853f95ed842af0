use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::debug;

use crate::ColorDBBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{DescriptorOptions, Opts, OutputFormat, SearchOptions};
use crate::search::{Neighbor, SearchParams, Searcher};
use crate::utils;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub descriptor: DescriptorOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的图片路径
    pub image: PathBuf,
    /// 从结果中排除的图片 ID，通常是查询图片自身
    #[arg(long, value_name = "ID")]
    pub exclude: Option<String>,
}

impl SubCommandExtend for SearchCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let db = ColorDBBuilder::new(opts.conf_dir.clone())
            .descriptor(self.descriptor.explicit())
            .open()?;
        debug!("descriptor config: {}", db.config());

        let image = utils::load_image(&self.image, self.image.to_string_lossy())?;
        let searcher = Searcher::new(self.search.distance_config());
        let params = SearchParams { top_k: Some(self.search.count), exclude: self.exclude.clone() };
        let result = db.search_image(&image, &searcher, &params)?;

        print_result(&result, self.search.output_format)
    }
}

fn print_result(result: &[Neighbor], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for n in result {
                println!("{:.4}\t{}", n.score, n.id);
            }
        }
    }
    Ok(())
}
