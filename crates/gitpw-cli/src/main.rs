//! Binary entrypoint for `git-pw`.

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = gitpw_cli::run().await;
    std::process::exit(code);
}
