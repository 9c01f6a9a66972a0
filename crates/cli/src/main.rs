use std::process::ExitCode;

fn main() -> ExitCode {
    farebot_cli::run()
}
