use anyhow::Result;
use clap::Parser;

use crate::ColorDBBuilder;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// 同时列出所有图片
    #[arg(short, long)]
    pub list: bool,
}

impl SubCommandExtend for ShowCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let db = ColorDBBuilder::new(opts.conf_dir.clone()).open()?;
        let index = db.index();

        println!("index:   {}", opts.conf_dir.index().display());
        println!("images:  {}", index.len());
        println!("config:  {}", index.config());
        println!("dim:     {}", index.dim());

        if self.list {
            for entry in index.iter() {
                let meta = &entry.metadata;
                let source = meta.source.as_deref().unwrap_or("-");
                println!("{}\t{}x{}\t{}", entry.id, meta.width, meta.height, source);
            }
        }
        Ok(())
    }
}
