pub mod diff;
pub mod init;
pub mod run;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct GlobalArgs {
    #[command(subcommand)]
    pub subcmd: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    #[command(alias("r"))]
    Run(run::Args),

    Init(init::Args),

    #[command(alias("d"))]
    Diff(diff::Args),
}

pub type SubcmdResult = anyhow::Result<()>;

impl GlobalArgs {
    pub async fn exec_subcmd(&self) -> SubcmdResult {
        use Subcommand::*;
        match &self.subcmd {
            Run(args) => run::exec(args, self).await,
            Init(args) => init::exec(args, self),
            Diff(args) => diff::exec(args, self),
        }
    }
}
