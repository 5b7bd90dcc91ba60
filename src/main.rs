use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match dashprobe_cli::cli::run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
