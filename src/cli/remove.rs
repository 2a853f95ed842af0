use anyhow::Result;
use clap::Parser;

use crate::ColorDBBuilder;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct RemoveCommand {
    /// 要删除的图片 ID
    #[arg(required = true)]
    pub ids: Vec<String>,
}

impl SubCommandExtend for RemoveCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let mut db = ColorDBBuilder::new(opts.conf_dir.clone()).open()?;
        let mut removed = 0;
        for id in &self.ids {
            match db.remove(id) {
                Ok(_) => {
                    removed += 1;
                    println!("[OK] Remove {}", id);
                }
                Err(e) => eprintln!("[ERR] {}", e),
            }
        }
        if removed > 0 {
            db.save()?;
        }
        Ok(())
    }
}
