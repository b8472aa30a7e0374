use std::path::PathBuf;

use anyhow::Context as _;
use kjudge_core::{
    judge,
    report::{self, ConsoleReporter, JsonReport},
    TestPlan,
};

use super::{GlobalArgs, SubcmdResult};
use crate::util;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Test plan file. Searched in the current dir and its ancestors if omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Overrides `candidate.command`; interpreted by the shell inside the scratch dir
    #[arg(short, long)]
    pub program: Option<String>,

    /// Also write the result as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,
}

pub async fn exec(args: &Args, _global_args: &GlobalArgs) -> SubcmdResult {
    let mut plan = match &args.config {
        Some(path) => TestPlan::from_toml_file(path)?,
        None => TestPlan::from_file_finding_in_ancestors(util::current_dir())?,
    };
    if let Some(program) = &args.program {
        plan.candidate.command = program.clone();
    }

    log::debug!("Test plan loaded from {:?}: {} groups", plan.source_dir, plan.groups().len());

    let supervisor = plan.supervisor();
    let summary = judge::run_plan(&plan, &supervisor, &mut ConsoleReporter::new()).await?;
    report::print_summary(&summary);

    if let Some(path) = &args.json {
        JsonReport::new(supervisor.get_command(), &summary)
            .save(path)
            .with_context(|| format!("Failed to write JSON report to {:?}", path))?;
    }

    if !summary.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}
