//! src/main.rs
//!
//! Entry point of the `vesper` binary. Prepares the environment (error
//! reporting, logging) then delegates to `vesper_cli::run()`.
//!
//! Keeping `main.rs` minimal means `lib.rs` stays unit-testable
//! (`cargo test -p vesper-cli`) without spawning a process.

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: could not install color-eyre: {e}");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    std::process::exit(vesper_cli::run());
}
