fn main() {
    if let Err(err) = marketplace_reports::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
