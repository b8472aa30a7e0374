use clap::Parser;
use kjudge_cli::cmd::GlobalArgs;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("KJUDGE_LOG", "warn")).init();

    let app = GlobalArgs::parse();
    app.exec_subcmd().await.unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    });
}
