//! vw binary entry point

fn main() {
    std::process::exit(verbwork::cli::run());
}
