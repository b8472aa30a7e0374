use std::path::PathBuf;

use anyhow::ensure;
use kjudge_core::{print_success, TestPlan};

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    #[arg(default_value = "./")]
    dir: PathBuf,
}

pub fn exec(args: &Args, _: &GlobalArgs) -> SubcmdResult {
    let filepath = args.dir.join(TestPlan::FILENAME);
    ensure!(
        !filepath.exists(),
        "Test plan already exists: {}",
        filepath.to_string_lossy()
    );
    fsutil::write_with_mkdir(&filepath, TestPlan::example_toml())?;
    print_success!(
        "Successfully created test plan. (path: {})",
        filepath.to_string_lossy()
    );
    Ok(())
}
