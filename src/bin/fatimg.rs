use clap::Parser;
use fatimg::cli::Cli;

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(fatimg::cli::run(cli));
}
