use std::path::PathBuf;

use tootline::RunOptions;

fn main() {
    let Some(options) = handle_cli_flags() else {
        return;
    };

    if let Err(err) = tootline::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// Returns `None` when a flag was fully handled and the program should exit.
fn handle_cli_flags() -> Option<RunOptions> {
    let mut options = RunOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("tootline {}", tootline::VERSION);
                return None;
            }
            "--help" | "-h" => {
                println!(
                    "tootline: read and write Mastodon timelines from the terminal.\n\n  --config <path>      Read settings from <path>\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                return None;
            }
            "--config" | "-c" => match args.next() {
                Some(path) => options.config_file = Some(PathBuf::from(path)),
                None => {
                    eprintln!("error: --config needs a path");
                    std::process::exit(2);
                }
            },
            other => {
                eprintln!("error: unknown argument {other:?} (see --help)");
                std::process::exit(2);
            }
        }
    }
    Some(options)
}
