fn main() {
    shogi_engine::usi::run_usi_loop();
}
