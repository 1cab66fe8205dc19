fn main() {
    visual_explain_lib::run()
}
