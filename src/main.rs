fn main() {
    let code = pf_runner::run_cli();
    if code != 0 {
        std::process::exit(code);
    }
}
