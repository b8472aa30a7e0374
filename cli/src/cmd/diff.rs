use std::path::PathBuf;

use colored::Colorize;
use kjudge_core::testing::verifier;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Output produced by the program
    #[arg()] // positional argument
    pub produced: PathBuf,

    /// Expected answer
    #[arg()]
    pub expected: PathBuf,
}

pub fn exec(args: &Args, _: &GlobalArgs) -> SubcmdResult {
    match verifier::compare_files(&args.produced, &args.expected)? {
        None => {
            println!("{}", "Outputs match".green());
            Ok(())
        }
        Some(mismatch) => {
            println!("{}", mismatch.to_string().bright_red());
            std::process::exit(1);
        }
    }
}
