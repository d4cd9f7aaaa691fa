//! pxr - Command-line tool for rendering run-length encoded sprites

use std::process::ExitCode;

use pxrender::cli;

fn main() -> ExitCode {
    cli::run()
}
