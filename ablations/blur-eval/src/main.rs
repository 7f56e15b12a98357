//! 横向模糊参数对校准评分稳定性的影响.

mod profile;
mod result;
mod runner;

fn main() {
    simple_logger::init_with_level(log::Level::Info).unwrap();
    println!("Running blur evaluation...");
    runner::run().analyze().unwrap();
}
