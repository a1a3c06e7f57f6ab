fn main() {
    kiro_tools::run_cli();
}
