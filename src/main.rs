fn main() {
    if let Err(err) = vicinity_map::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
