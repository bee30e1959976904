fn main() {
    perpvault::cli::run();
}
