use std::process::ExitCode;

use junction_mover::RelocateError;
use junction_mover::output as out;

mod app;
mod logging;

fn main() -> ExitCode {
    let args = junction_mover::cli::parse();
    match app::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            out::print_error(&format!("{e:#}"));
            let code = e
                .downcast_ref::<RelocateError>()
                .map(RelocateError::code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
