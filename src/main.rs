use anyhow::Result;
use clap::Parser;
use colorsearch::Opts;
use colorsearch::cli::SubCommandExtend;
use colorsearch::config::SubCommand;
use log::debug;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn main() -> Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    rayon::ThreadPoolBuilder::new().num_threads(opts.threads).build_global()?;
    debug!("using {} threads", opts.threads);

    match &opts.subcmd {
        SubCommand::Add(cmd) => cmd.run(&opts),
        SubCommand::Search(cmd) => cmd.run(&opts),
        SubCommand::Remove(cmd) => cmd.run(&opts),
        SubCommand::Show(cmd) => cmd.run(&opts),
    }
}
