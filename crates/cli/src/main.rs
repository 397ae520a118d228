use std::process::ExitCode;

fn main() -> ExitCode {
    vendedor_cli::run()
}
