use std::process::ExitCode;

fn main() -> ExitCode {
    sentinel_cli::run()
}
