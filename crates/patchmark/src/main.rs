use clap::Parser;

use patchmark::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    patchmark::init(cli.verbose);
    cli::run(cli)
}
