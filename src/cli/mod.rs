mod add;
mod remove;
mod search;
mod show;

pub use add::*;
pub use remove::*;
pub use search::*;
pub use show::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}
